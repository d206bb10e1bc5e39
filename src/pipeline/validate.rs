// src/pipeline/validate.rs

//! Structural checks applied to every fragment before merging.

use crate::error::{AppError, Result};
use crate::models::EnrichedFragment;

/// Digits a dialable Korean number carries, including 15xx-xxxx numbers.
const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 8..=13;

/// Drops fragments with impossible values.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataValidator;

impl DataValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check one fragment, naming the first violated rule.
    pub fn check(&self, fragment: &EnrichedFragment) -> Result<()> {
        let reject = |reason: String| -> Result<()> {
            Err(AppError::validation(format!(
                "[{}] {}: {}",
                fragment.source, fragment.name, reason
            )))
        };

        if fragment.name.trim().is_empty() {
            return reject("empty name".into());
        }
        if !fragment.confidence.is_finite() || !(0.0..=1.0).contains(&fragment.confidence) {
            return reject(format!("confidence {} outside [0, 1]", fragment.confidence));
        }
        if let (Some(open), Some(close)) = (fragment.open_hour, fragment.close_hour) {
            if close <= open {
                return reject(format!("closes at {close} before opening at {open}"));
            }
        }
        if let Some(phone) = &fragment.phone {
            if !is_phone(phone) {
                return reject(format!("malformed phone '{phone}'"));
            }
        }
        if let Some(rating) = fragment.rating {
            if !rating.is_finite() || !(0.0..=5.0).contains(&rating) {
                return reject(format!("rating {rating} outside [0, 5]"));
            }
        }
        if fragment.price == Some(0) {
            return reject("zero price".into());
        }
        Ok(())
    }
}

fn is_phone(phone: &str) -> bool {
    let body = phone.strip_prefix('+').unwrap_or(phone);
    let digits = body.chars().filter(char::is_ascii_digit).count();
    !body.starts_with('-')
        && !body.ends_with('-')
        && body.chars().all(|c| c.is_ascii_digit() || c == '-')
        && PHONE_DIGITS.contains(&digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClockTime;

    fn fragment() -> EnrichedFragment {
        EnrichedFragment {
            phone: Some("02-555-1234".into()),
            open_hour: ClockTime::from_hm(6, 0),
            close_hour: ClockTime::from_hm(23, 0),
            rating: Some(4.5),
            ..EnrichedFragment::new("naver_search".into(), "강남 피트니스", "서울시 강남구", 0.6)
        }
    }

    #[test]
    fn test_accepts_plausible_fragment() {
        assert!(DataValidator::new().check(&fragment()).is_ok());
        let bare = EnrichedFragment::new("daum_cafe".into(), "짐", "", 0.0);
        assert!(DataValidator::new().check(&bare).is_ok());
    }

    #[test]
    fn test_rejects_inverted_hours() {
        let f = EnrichedFragment {
            open_hour: ClockTime::from_hm(22, 0),
            close_hour: ClockTime::from_hm(6, 0),
            ..fragment()
        };
        let err = DataValidator::new().check(&f).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let same = EnrichedFragment {
            close_hour: ClockTime::from_hm(6, 0),
            open_hour: ClockTime::from_hm(6, 0),
            ..fragment()
        };
        assert!(DataValidator::new().check(&same).is_err());
    }

    #[test]
    fn test_rejects_confidence_out_of_range() {
        for confidence in [-0.1, 1.01, f64::NAN] {
            let f = EnrichedFragment {
                confidence,
                ..fragment()
            };
            assert!(DataValidator::new().check(&f).is_err(), "{confidence}");
        }
    }

    #[test]
    fn test_phone_shapes() {
        for phone in ["02-555-1234", "1588-1234", "+82-2-555-1234", "01012345678"] {
            assert!(is_phone(phone), "{phone}");
        }
        for phone in ["", "-", "123", "02-555-12a4", "02-555-1234-"] {
            assert!(!is_phone(phone), "{phone}");
        }
        let f = EnrichedFragment {
            phone: Some(String::new()),
            ..fragment()
        };
        assert!(DataValidator::new().check(&f).is_err());
    }
}
