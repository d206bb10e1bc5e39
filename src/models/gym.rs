// src/models/gym.rs

//! Gym stubs, per-source fragments and merged profiles.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Identifier of a configured source (e.g. `naver_search`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Time of day in minutes since midnight. `24:00` is allowed as a closing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(u16);

impl ClockTime {
    pub const MIDNIGHT: ClockTime = ClockTime(0);
    pub const END_OF_DAY: ClockTime = ClockTime(24 * 60);

    /// Build from hour and minute, rejecting anything past `24:00`.
    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if minute >= 60 || hour > 24 || (hour == 24 && minute != 0) {
            return None;
        }
        Some(Self(hour * 60 + minute))
    }

    /// Parse `H:MM` / `HH:MM`.
    pub fn parse(text: &str) -> Option<Self> {
        let (h, m) = text.trim().split_once(':')?;
        let hour = h.trim().parse().ok()?;
        let minute = m.trim().parse().ok()?;
        Self::from_hm(hour, minute)
    }

    pub fn minutes(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid clock time '{value}'"))
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

/// Unenriched input record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GymStub {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Facility category (e.g. "gym", "pilates")
    #[serde(rename = "type", default = "default_gym_type")]
    pub gym_type: String,

    #[serde(default = "default_stub_source")]
    pub source: String,

    #[serde(default)]
    pub confidence: f64,
}

fn default_gym_type() -> String {
    "gym".into()
}

fn default_stub_source() -> String {
    "seed".into()
}

impl GymStub {
    pub fn new(name: impl Into<String>, address: Option<&str>) -> Self {
        Self {
            name: name.into(),
            address: address.map(str::to_string),
            gym_type: default_gym_type(),
            source: default_stub_source(),
            confidence: 0.0,
        }
    }

    /// Load stubs from a JSON array file.
    pub fn load_all(path: impl AsRef<Path>) -> Result<Vec<Self>> {
        let content = fs::read_to_string(path)?;
        let stubs: Vec<Self> = serde_json::from_str(&content)?;
        if let Some(pos) = stubs.iter().position(|s| s.name.trim().is_empty()) {
            return Err(AppError::validation(format!(
                "gym stub #{pos} has an empty name"
            )));
        }
        Ok(stubs)
    }
}

/// Partial enrichment produced by one source for one gym.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedFragment {
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub open_hour: Option<ClockTime>,
    pub close_hour: Option<ClockTime>,
    /// Monthly membership price in KRW
    pub price: Option<u32>,
    /// Rating on a 0-5 scale
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub facilities: BTreeSet<String>,
    pub source: SourceId,
    pub confidence: f64,
}

impl EnrichedFragment {
    /// An empty fragment; callers fill the discovered fields with struct update syntax.
    pub fn new(
        source: SourceId,
        name: impl Into<String>,
        address: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            phone: None,
            open_hour: None,
            close_hour: None,
            price: None,
            rating: None,
            review_count: None,
            facilities: BTreeSet::new(),
            source,
            confidence,
        }
    }
}

/// Final merged result for one gym.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedProfile {
    pub name: String,
    pub address: Option<String>,
    #[serde(rename = "type")]
    pub gym_type: String,
    pub phone: Option<String>,
    pub open_hour: Option<ClockTime>,
    pub close_hour: Option<ClockTime>,
    pub price: Option<u32>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub facilities: BTreeSet<String>,
    pub contributing_sources: Vec<SourceId>,
    pub confidence: f64,
}

impl MergedProfile {
    /// Profile for a gym no source could enrich.
    pub fn minimal(stub: &GymStub) -> Self {
        Self {
            name: stub.name.clone(),
            address: stub.address.clone(),
            gym_type: stub.gym_type.clone(),
            phone: None,
            open_hour: None,
            close_hour: None,
            price: None,
            rating: None,
            review_count: None,
            facilities: BTreeSet::new(),
            contributing_sources: Vec::new(),
            confidence: 0.0,
        }
    }

    pub fn is_enriched(&self) -> bool {
        !self.contributing_sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_time_parses_and_formats() {
        let t = ClockTime::parse("6:30").unwrap();
        assert_eq!(t.minutes(), 390);
        assert_eq!(t.to_string(), "06:30");
        assert_eq!(ClockTime::parse("24:00"), Some(ClockTime::END_OF_DAY));
        assert_eq!(ClockTime::parse("24:30"), None);
        assert_eq!(ClockTime::parse("12:60"), None);
        assert_eq!(ClockTime::parse("noon"), None);
    }

    #[test]
    fn stub_defaults_when_fields_missing() {
        let stubs: Vec<GymStub> =
            serde_json::from_str(r#"[{"name":"강남 피트니스","address":"서울시 강남구"},{"name":"역삼짐"}]"#)
                .unwrap();
        assert_eq!(stubs[0].source, "seed");
        assert_eq!(stubs[0].gym_type, "gym");
        assert_eq!(stubs[0].confidence, 0.0);
        assert_eq!(stubs[1].address, None);
    }

    #[test]
    fn load_all_rejects_empty_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gyms.json");
        fs::write(&path, r#"[{"name":"  "}]"#).unwrap();
        assert!(GymStub::load_all(&path).is_err());
    }

    #[test]
    fn minimal_profile_has_no_sources() {
        let stub = GymStub::new("강남 피트니스", Some("서울시 강남구"));
        let profile = MergedProfile::minimal(&stub);
        assert!(!profile.is_enriched());
        assert_eq!(profile.confidence, 0.0);
        assert_eq!(profile.address.as_deref(), Some("서울시 강남구"));
    }

    #[test]
    fn profile_serializes_camel_case() {
        let stub = GymStub::new("역삼짐", None);
        let json = serde_json::to_value(MergedProfile::minimal(&stub)).unwrap();
        assert!(json.get("contributingSources").is_some());
        assert!(json.get("openHour").is_some());
        assert_eq!(json["type"], "gym");
    }
}
