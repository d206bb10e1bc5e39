// src/pipeline/merge.rs

//! Reduce validated fragments for one gym into a single profile.

use std::cmp::Ordering;

use crate::models::{EnrichedFragment, GymStub, MergedProfile, SourceId};

/// Confidence-ranked merge with source priority as tie-break.
///
/// The result depends only on the set of fragments, never on their order.
#[derive(Debug, Clone, Default)]
pub struct DataMerger {
    priority: Vec<SourceId>,
}

impl DataMerger {
    /// `priority` lists source ids from most to least preferred.
    pub fn new(priority: Vec<SourceId>) -> Self {
        Self { priority }
    }

    fn rank(&self, source: &SourceId) -> usize {
        self.priority
            .iter()
            .position(|id| id == source)
            .unwrap_or(usize::MAX)
    }

    fn compare(&self, a: &EnrichedFragment, b: &EnrichedFragment) -> Ordering {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| self.rank(&a.source).cmp(&self.rank(&b.source)))
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.address.cmp(&b.address))
    }

    /// Merge `fragments` for `stub`.
    ///
    /// Each scalar comes from the best-ranked fragment that has it; opening
    /// and closing hours always come from the same fragment, preferring one
    /// that has both. Facilities are
    /// unioned and the confidence is the best single-source confidence.
    pub fn merge(&self, stub: &GymStub, fragments: &[EnrichedFragment]) -> MergedProfile {
        if fragments.is_empty() {
            return MergedProfile::minimal(stub);
        }

        let mut ordered: Vec<&EnrichedFragment> = fragments.iter().collect();
        ordered.sort_by(|a, b| self.compare(a, b));

        let (open_hour, close_hour) = ordered
            .iter()
            .find(|f| f.open_hour.is_some() && f.close_hour.is_some())
            .or_else(|| {
                ordered
                    .iter()
                    .find(|f| f.open_hour.is_some() || f.close_hour.is_some())
            })
            .map(|f| (f.open_hour, f.close_hour))
            .unwrap_or_default();

        let address = stub
            .address
            .clone()
            .filter(|a| !a.trim().is_empty())
            .or_else(|| {
                ordered
                    .iter()
                    .map(|f| f.address.trim())
                    .find(|a| !a.is_empty())
                    .map(str::to_string)
            });

        let mut contributing_sources: Vec<SourceId> =
            ordered.iter().map(|f| f.source.clone()).collect();
        contributing_sources.sort_by(|a, b| self.rank(a).cmp(&self.rank(b)).then_with(|| a.cmp(b)));
        contributing_sources.dedup();

        MergedProfile {
            name: stub.name.clone(),
            address,
            gym_type: stub.gym_type.clone(),
            phone: ordered.iter().find_map(|f| f.phone.clone()),
            open_hour,
            close_hour,
            price: ordered.iter().find_map(|f| f.price),
            rating: ordered.iter().find_map(|f| f.rating),
            review_count: ordered.iter().find_map(|f| f.review_count),
            facilities: ordered
                .iter()
                .flat_map(|f| f.facilities.iter().cloned())
                .collect(),
            contributing_sources,
            confidence: ordered[0].confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClockTime;

    fn merger() -> DataMerger {
        DataMerger::new(vec!["kakao_place".into(), "naver_search".into(), "naver_blog".into()])
    }

    fn tags(items: &[&str]) -> std::collections::BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn place() -> EnrichedFragment {
        EnrichedFragment {
            phone: Some("02-555-1234".into()),
            open_hour: ClockTime::from_hm(6, 0),
            close_hour: ClockTime::from_hm(23, 0),
            facilities: tags(&["PT", "샤워시설"]),
            ..EnrichedFragment::new("kakao_place".into(), "강남 피트니스", "서울 강남구 테헤란로 1", 0.8)
        }
    }

    fn search() -> EnrichedFragment {
        EnrichedFragment {
            phone: Some("02-000-0000".into()),
            open_hour: ClockTime::from_hm(5, 0),
            close_hour: ClockTime::from_hm(24, 0),
            price: Some(55_000),
            facilities: tags(&["GX", "PT"]),
            ..EnrichedFragment::new("naver_search".into(), "강남 피트니스", "", 0.6)
        }
    }

    fn blog() -> EnrichedFragment {
        EnrichedFragment {
            rating: Some(4.2),
            facilities: tags(&["주차"]),
            ..EnrichedFragment::new("naver_blog".into(), "강남 피트니스", "", 0.6)
        }
    }

    #[test]
    fn test_highest_confidence_scalars_win() {
        let stub = GymStub::new("강남 피트니스", Some("서울시 강남구"));
        let profile = merger().merge(&stub, &[search(), place()]);

        assert_eq!(profile.confidence, 0.8);
        assert_eq!(profile.phone.as_deref(), Some("02-555-1234"));
        assert_eq!(profile.open_hour, ClockTime::from_hm(6, 0));
        assert_eq!(profile.close_hour, ClockTime::from_hm(23, 0));
        assert_eq!(profile.price, Some(55_000));
        assert_eq!(profile.facilities, tags(&["GX", "PT", "샤워시설"]));
        assert_eq!(profile.address.as_deref(), Some("서울시 강남구"));
        assert_eq!(
            profile.contributing_sources,
            vec![SourceId::from("kakao_place"), SourceId::from("naver_search")]
        );
    }

    #[test]
    fn test_priority_breaks_confidence_ties() {
        let stub = GymStub::new("강남 피트니스", None);
        let blog = EnrichedFragment {
            phone: Some("02-111-2222".into()),
            ..blog()
        };
        let profile = merger().merge(&stub, &[blog, search()]);
        assert_eq!(profile.phone.as_deref(), Some("02-000-0000"));
        assert_eq!(profile.rating, Some(4.2));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let stub = GymStub::new("강남 피트니스", None);
        let fragments = [place(), search(), blog()];
        let expected = merger().merge(&stub, &fragments);

        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for order in orders {
            let permuted: Vec<_> = order.iter().map(|&i| fragments[i].clone()).collect();
            assert_eq!(merger().merge(&stub, &permuted), expected, "{order:?}");
        }
        let twice = merger().merge(&stub, &fragments);
        assert_eq!(twice, expected);
    }

    #[test]
    fn test_hours_prefer_fragment_with_both_ends() {
        let stub = GymStub::new("강남 피트니스", None);
        let half = EnrichedFragment {
            close_hour: None,
            ..place()
        };
        let profile = merger().merge(&stub, &[half.clone(), search()]);
        assert_eq!(profile.open_hour, ClockTime::from_hm(5, 0));
        assert_eq!(profile.close_hour, ClockTime::from_hm(24, 0));
        assert_eq!(profile.phone.as_deref(), Some("02-555-1234"));

        let profile = merger().merge(&stub, &[half, blog()]);
        assert_eq!(profile.open_hour, ClockTime::from_hm(6, 0));
        assert_eq!(profile.close_hour, None);
    }

    #[test]
    fn test_address_falls_back_to_fragment() {
        let stub = GymStub::new("강남 피트니스", None);
        let profile = merger().merge(&stub, &[search(), place()]);
        assert_eq!(profile.address.as_deref(), Some("서울 강남구 테헤란로 1"));
    }

    #[test]
    fn test_no_fragments_gives_minimal_profile() {
        let stub = GymStub::new("강남 피트니스", Some("서울시 강남구"));
        let profile = merger().merge(&stub, &[]);
        assert_eq!(profile, MergedProfile::minimal(&stub));
        assert_eq!(profile.confidence, 0.0);
        assert!(!profile.is_enriched());
    }
}
