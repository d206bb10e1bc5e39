//! Text extraction heuristics shared by every source.
//!
//! Sources differ in how they obtain text; once they have it, phone, hours,
//! price, rating and facility extraction is the same.

use std::collections::BTreeSet;

use regex::Regex;

use crate::error::{AppError, Result};
use crate::models::{ClockTime, FacilityKeyword};

/// Plausible monthly membership range in KRW.
const PRICE_RANGE: std::ops::RangeInclusive<u32> = 10_000..=3_000_000;

/// Fields found in a block of text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signals {
    pub phone: Option<String>,
    pub open_hour: Option<ClockTime>,
    pub close_hour: Option<ClockTime>,
    pub price: Option<u32>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub facilities: BTreeSet<String>,
}

impl Signals {
    pub fn is_empty(&self) -> bool {
        self.phone.is_none()
            && self.open_hour.is_none()
            && self.close_hour.is_none()
            && self.price.is_none()
            && self.rating.is_none()
            && self.review_count.is_none()
            && self.facilities.is_empty()
    }
}

/// Compiled extraction patterns plus a facility vocabulary.
#[derive(Debug, Clone)]
pub struct Extractor {
    phone: Regex,
    hours: Regex,
    hours_korean: Regex,
    all_day: Regex,
    price_man: Regex,
    price_won: Regex,
    rating: Regex,
    review_count: Regex,
    facility_keywords: Vec<FacilityKeyword>,
}

impl Extractor {
    pub fn new(facility_keywords: Vec<FacilityKeyword>) -> Result<Self> {
        Ok(Self {
            phone: compile(
                r"(?:^|[^\d])((?:\+82[-\s]?|0)\d{1,2}[-.)\s]?\d{3,4}[-.\s]?\d{4}|1[5-9]\d{2}-\d{4})(?:[^\d]|$)",
            )?,
            hours: compile(
                r"(\d{1,2})\s*:\s*(\d{2})\s*(?:~|-|–|부터)\s*(?:익일\s*)?(\d{1,2})\s*:\s*(\d{2})",
            )?,
            hours_korean: compile(r"(\d{1,2})\s*시\s*(?:~|-|–|부터)\s*(\d{1,2})\s*시")?,
            all_day: compile(r"24\s*시간|24\s*[Hh]ours?|연중무휴\s*24")?,
            price_man: compile(r"(\d+(?:\.\d+)?)\s*만\s*원")?,
            price_won: compile(r"(\d{1,3}(?:,\d{3})+|\d{4,})\s*원")?,
            rating: compile(r"(?i)(?:평점|별점|rating|★)\s*[:：]?\s*(\d(?:\.\d{1,2})?)(?:[^\d]|$)")?,
            review_count: compile(
                r"(?i)(?:방문자\s*리뷰|블로그\s*리뷰|리뷰|후기|reviews?)\s*[:：]?\s*(\d[\d,]*)",
            )?,
            facility_keywords,
        })
    }

    /// Run every heuristic over `text`.
    pub fn extract(&self, text: &str) -> Signals {
        let (open_hour, close_hour) = self.hours(text).unzip();
        Signals {
            phone: self.phone(text),
            open_hour,
            close_hour,
            price: self.price(text),
            rating: self.rating(text),
            review_count: self.review_count(text),
            facilities: self.facilities(text),
        }
    }

    /// First phone number, separators normalized to `-`.
    pub fn phone(&self, text: &str) -> Option<String> {
        let raw = self.phone.captures(text)?.get(1)?.as_str();
        let mut phone = String::with_capacity(raw.len());
        for c in raw.chars() {
            match c {
                '0'..='9' | '+' => phone.push(c),
                '-' | '.' | ')' | ' ' if !phone.ends_with('-') => phone.push('-'),
                _ => {}
            }
        }
        Some(phone)
    }

    /// Opening and closing time. Overnight ranges are ignored.
    pub fn hours(&self, text: &str) -> Option<(ClockTime, ClockTime)> {
        if self.all_day.is_match(text) {
            return Some((ClockTime::MIDNIGHT, ClockTime::END_OF_DAY));
        }

        let mut parsed = self
            .hours
            .captures_iter(text)
            .filter_map(|caps| {
                let open = ClockTime::from_hm(caps[1].parse().ok()?, caps[2].parse().ok()?)?;
                let close = ClockTime::from_hm(caps[3].parse().ok()?, caps[4].parse().ok()?)?;
                Some((open, close))
            })
            .chain(self.hours_korean.captures_iter(text).filter_map(|caps| {
                let open = ClockTime::from_hm(caps[1].parse().ok()?, 0)?;
                let close = ClockTime::from_hm(caps[2].parse().ok()?, 0)?;
                Some((open, close))
            }));

        parsed.find(|(open, close)| close > open)
    }

    /// Monthly price in KRW within a plausible range.
    pub fn price(&self, text: &str) -> Option<u32> {
        let man = self.price_man.captures_iter(text).filter_map(|caps| {
            let value: f64 = caps[1].parse().ok()?;
            Some((value * 10_000.0).round() as u32)
        });
        let won = self
            .price_won
            .captures_iter(text)
            .filter_map(|caps| caps[1].replace(',', "").parse::<u32>().ok());

        man.chain(won).find(|price| PRICE_RANGE.contains(price))
    }

    /// Rating on a 0-5 scale.
    pub fn rating(&self, text: &str) -> Option<f64> {
        self.rating
            .captures_iter(text)
            .filter_map(|caps| caps[1].parse::<f64>().ok())
            .find(|r| (0.0..=5.0).contains(r))
    }

    pub fn review_count(&self, text: &str) -> Option<u32> {
        let caps = self.review_count.captures(text)?;
        caps[1].replace(',', "").parse().ok()
    }

    /// Facility tags whose keyword occurs in `text`.
    pub fn facilities(&self, text: &str) -> BTreeSet<String> {
        self.facility_keywords
            .iter()
            .filter(|k| text.contains(&k.keyword))
            .map(|k| k.tag.clone())
            .collect()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AppError::config(format!("bad pattern '{pattern}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_facility_keywords;

    fn extractor() -> Extractor {
        Extractor::new(default_facility_keywords()).unwrap()
    }

    #[test]
    fn test_phone_formats() {
        let ex = extractor();
        assert_eq!(ex.phone("전화 02-555-1234 문의"), Some("02-555-1234".into()));
        assert_eq!(ex.phone("tel:031.123.4567"), Some("031-123-4567".into()));
        assert_eq!(ex.phone("010 1234 5678"), Some("010-1234-5678".into()));
        assert_eq!(ex.phone("대표번호1588-1234"), Some("1588-1234".into()));
        assert_eq!(ex.phone("주문번호 20240115123456"), None);
        assert_eq!(ex.phone("전화번호 없음"), None);
    }

    #[test]
    fn test_hours_patterns() {
        let ex = extractor();
        let (open, close) = ex.hours("영업시간 06:00 ~ 23:00").unwrap();
        assert_eq!(open.to_string(), "06:00");
        assert_eq!(close.to_string(), "23:00");

        let (open, close) = ex.hours("평일 7시-22시 운영").unwrap();
        assert_eq!((open.to_string(), close.to_string()), ("07:00".into(), "22:00".into()));

        let (open, close) = ex.hours("24시간 운영합니다").unwrap();
        assert_eq!((open, close), (ClockTime::MIDNIGHT, ClockTime::END_OF_DAY));
    }

    #[test]
    fn test_overnight_hours_are_skipped() {
        let ex = extractor();
        assert_eq!(ex.hours("06:00 ~ 익일 01:00"), None);
        let (open, close) = ex.hours("06:00 ~ 01:00, 주말 09:00 ~ 18:00").unwrap();
        assert_eq!((open.to_string(), close.to_string()), ("09:00".into(), "18:00".into()));
    }

    #[test]
    fn test_price_patterns() {
        let ex = extractor();
        assert_eq!(ex.price("1개월 55,000원"), Some(55_000));
        assert_eq!(ex.price("월 5만원"), Some(50_000));
        assert_eq!(ex.price("월 4.5만 원"), Some(45_000));
        assert_eq!(ex.price("주차 1,000원"), None);
    }

    #[test]
    fn test_rating_and_reviews() {
        let ex = extractor();
        assert_eq!(ex.rating("별점 4.5 / 방문자리뷰 1,234"), Some(4.5));
        assert_eq!(ex.rating("★4.8"), Some(4.8));
        assert_eq!(ex.rating("평점 9.5"), None);
        assert_eq!(ex.review_count("방문자리뷰 1,234"), Some(1234));
        assert_eq!(ex.review_count("Reviews: 87"), Some(87));
    }

    #[test]
    fn test_facilities_use_vocabulary() {
        let ex = extractor();
        let tags = ex.facilities("샤워 가능, PT 전문, GX 프로그램, 무료 주차");
        let expected: BTreeSet<String> = ["샤워시설", "PT", "GX", "주차"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(tags, expected);

        let custom = Extractor::new(vec![FacilityKeyword::new("수영", "수영장")]).unwrap();
        assert!(custom.facilities("샤워 가능").is_empty());
        assert!(custom.facilities("수영 강습").contains("수영장"));
    }

    #[test]
    fn test_extract_empty_text() {
        let ex = extractor();
        assert!(ex.extract("검색 결과가 없습니다").is_empty());
        let signals = ex.extract("영업시간 06:00~23:00 / 02-555-1234 / 샤워");
        assert!(!signals.is_empty());
        assert_eq!(signals.phone.as_deref(), Some("02-555-1234"));
        assert!(signals.facilities.contains("샤워시설"));
    }
}
