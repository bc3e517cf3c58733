//! Nearest-neighbour identification of an observed descriptor against the
//! registered references.

use crate::store::DescriptorStore;
use crate::types::{FaceDescriptor, Identity, NamedDescriptor};

/// Encoder-agnostic default distance tolerance.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Result of comparing a probe descriptor against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub identity: Identity,
    /// Distance to the nearest gallery entry (`None` for an empty gallery).
    pub distance: Option<f32>,
    /// Insertion index of the nearest gallery entry.
    pub index: Option<usize>,
}

impl MatchOutcome {
    fn unknown() -> Self {
        Self {
            identity: Identity::Unknown,
            distance: None,
            index: None,
        }
    }
}

/// Strategy for comparing a probe descriptor against registered references.
pub trait Matcher {
    fn compare(&self, probe: &FaceDescriptor, gallery: &[NamedDescriptor]) -> MatchOutcome;

    /// Identify `probe` against every entry of `store`.
    fn identify(&self, probe: &FaceDescriptor, store: &DescriptorStore) -> Identity {
        self.compare(probe, store.entries()).identity
    }
}

/// Two-pass nearest-neighbour matcher.
///
/// Every entry gets a tolerance flag, then the globally closest entry is
/// selected; its name is reported only if its own flag passed. Ties on the
/// minimum distance resolve to the earliest inserted entry.
#[derive(Debug, Clone, Copy)]
pub struct NearestNeighborMatcher {
    tolerance: f32,
}

impl NearestNeighborMatcher {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }
}

impl Default for NearestNeighborMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl Matcher for NearestNeighborMatcher {
    fn compare(&self, probe: &FaceDescriptor, gallery: &[NamedDescriptor]) -> MatchOutcome {
        if gallery.is_empty() {
            return MatchOutcome::unknown();
        }

        let flags: Vec<bool> = gallery
            .iter()
            .map(|entry| probe.matches(&entry.descriptor, self.tolerance))
            .collect();
        let distances: Vec<f32> = gallery
            .iter()
            .map(|entry| probe.distance(&entry.descriptor))
            .collect();

        // Strict `<` keeps the first occurrence of the minimum. NaN never wins.
        let mut best_idx = 0;
        for (i, &d) in distances.iter().enumerate().skip(1) {
            if d < distances[best_idx] || (distances[best_idx].is_nan() && !d.is_nan()) {
                best_idx = i;
            }
        }

        let identity = if flags[best_idx] {
            Identity::Known(gallery[best_idx].name.clone())
        } else {
            Identity::Unknown
        };

        MatchOutcome {
            identity,
            distance: Some(distances[best_idx]),
            index: Some(best_idx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, values: &[f32]) -> NamedDescriptor {
        NamedDescriptor {
            name: name.into(),
            descriptor: FaceDescriptor::new(values.to_vec()),
        }
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let probe = FaceDescriptor::new(vec![0.1, 0.2]);
        let outcome = NearestNeighborMatcher::default().compare(&probe, &[]);
        assert_eq!(outcome.identity, Identity::Unknown);
        assert_eq!(outcome.distance, None);
        assert_eq!(outcome.index, None);
    }

    #[test]
    fn test_exact_descriptor_always_matches() {
        let gallery = vec![
            entry("bob", &[1.0, 1.0, 1.0]),
            entry("alice", &[0.2, 0.4, 0.6]),
        ];
        let probe = FaceDescriptor::new(vec![0.2, 0.4, 0.6]);
        // Even a zero tolerance accepts a zero distance.
        let outcome = NearestNeighborMatcher::new(0.0).compare(&probe, &gallery);
        assert_eq!(outcome.identity, Identity::Known("alice".into()));
        assert_eq!(outcome.distance, Some(0.0));
    }

    #[test]
    fn test_nearest_wins_when_several_pass() {
        // carol at 0.5, dave at 0.1: both within 0.6, dave is closer.
        let gallery = vec![entry("carol", &[0.5, 0.0]), entry("dave", &[0.1, 0.0])];
        let probe = FaceDescriptor::new(vec![0.0, 0.0]);
        let outcome = NearestNeighborMatcher::new(0.6).compare(&probe, &gallery);
        assert_eq!(outcome.identity, Identity::Known("dave".into()));
        assert_eq!(outcome.index, Some(1));
    }

    #[test]
    fn test_tie_resolves_to_first_inserted() {
        let gallery = vec![
            entry("first", &[0.3, 0.0]),
            entry("second", &[-0.3, 0.0]),
            entry("third", &[0.0, 0.3]),
        ];
        let probe = FaceDescriptor::new(vec![0.0, 0.0]);
        let outcome = NearestNeighborMatcher::new(0.6).compare(&probe, &gallery);
        assert_eq!(outcome.identity, Identity::Known("first".into()));
        assert_eq!(outcome.index, Some(0));
    }

    #[test]
    fn test_single_entry_within_tolerance() {
        let gallery = vec![entry("alice", &[0.0, 0.0])];
        let probe = FaceDescriptor::new(vec![0.1, 0.0]);
        let outcome = NearestNeighborMatcher::new(0.6).compare(&probe, &gallery);
        assert_eq!(outcome.identity, Identity::Known("alice".into()));
    }

    #[test]
    fn test_single_entry_beyond_tolerance_is_unknown() {
        let gallery = vec![entry("alice", &[0.0, 0.0])];
        let probe = FaceDescriptor::new(vec![0.9, 0.0]);
        let outcome = NearestNeighborMatcher::new(0.6).compare(&probe, &gallery);
        assert_eq!(outcome.identity, Identity::Unknown);
        assert_eq!(outcome.index, Some(0));
        assert!((outcome.distance.unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_duplicate_names_are_all_candidates() {
        // Two photos of erin; the second is the close one.
        let gallery = vec![
            entry("erin", &[2.0, 0.0]),
            entry("frank", &[0.0, 0.5]),
            entry("erin", &[0.05, 0.0]),
        ];
        let probe = FaceDescriptor::new(vec![0.0, 0.0]);
        let outcome = NearestNeighborMatcher::new(0.6).compare(&probe, &gallery);
        assert_eq!(outcome.identity, Identity::Known("erin".into()));
        assert_eq!(outcome.index, Some(2));
    }

    #[test]
    fn test_identify_uses_store() {
        let mut store = DescriptorStore::new();
        store.push("alice", FaceDescriptor::new(vec![1.0, 0.0]));
        let matcher = NearestNeighborMatcher::default();
        assert_eq!(
            matcher.identify(&FaceDescriptor::new(vec![1.0, 0.0]), &store),
            Identity::Known("alice".into())
        );
        assert_eq!(
            matcher.identify(&FaceDescriptor::new(vec![0.0, 1.0]), &DescriptorStore::new()),
            Identity::Unknown
        );
    }
}
