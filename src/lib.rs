// src/lib.rs

//! Gym enrichment library.
//!
//! Queries several unreliable web sources for each gym, guards every call
//! with a circuit breaker and adaptive retry, and merges the partial results
//! into one confidence-ranked profile per gym.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;
