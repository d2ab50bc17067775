//! Probe-vs-gallery matching.

use crate::types::{Embedding, FaceRecord};

/// Cosine similarity a probe must strictly exceed to count as a match.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Wire label for a probe that matched nothing.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Match { identity: String, similarity: f32 },
    Unknown,
}

impl MatchOutcome {
    /// The matched identity, or `"Unknown"`.
    pub fn label(&self) -> &str {
        match self {
            MatchOutcome::Match { identity, .. } => identity,
            MatchOutcome::Unknown => UNKNOWN_LABEL,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Match { .. })
    }
}

/// Collapse a gallery to one record per identity, keeping the last stored
/// row for each identity in the position where that identity first appeared.
///
/// Re-registering an identity replaces its reference face rather than adding
/// a second one.
pub fn latest_per_identity(gallery: Vec<FaceRecord>) -> Vec<FaceRecord> {
    let mut collapsed: Vec<FaceRecord> = Vec::with_capacity(gallery.len());
    for record in gallery {
        match collapsed.iter_mut().find(|r| r.identity == record.identity) {
            Some(slot) => *slot = record,
            None => collapsed.push(record),
        }
    }
    collapsed
}

/// Strategy for comparing a probe embedding against a gallery of stored faces.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[FaceRecord], threshold: f32) -> MatchOutcome;
}

/// Linear scan in gallery order that returns the first record whose cosine
/// similarity strictly exceeds the threshold.
///
/// There is no search for a global best: when several records clear the
/// threshold, gallery order decides. Pairs without a defined cosine (zero
/// norm, mismatched lengths) never match, whatever the threshold.
pub struct FirstMatchMatcher;

impl Matcher for FirstMatchMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[FaceRecord], threshold: f32) -> MatchOutcome {
        for record in gallery {
            let Some(similarity) = probe.cosine(&record.embedding) else {
                continue;
            };
            if similarity > threshold {
                return MatchOutcome::Match {
                    identity: record.identity.clone(),
                    similarity,
                };
            }
        }
        MatchOutcome::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(identity: &str, values: &[f32]) -> FaceRecord {
        FaceRecord {
            id: None,
            identity: identity.into(),
            embedding: Embedding::new(values.to_vec()),
            created_at: None,
        }
    }

    fn probe(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let outcome = FirstMatchMatcher.compare(&probe(&[1.0, 0.0]), &[], 0.7);
        assert_eq!(outcome, MatchOutcome::Unknown);
        assert_eq!(outcome.label(), "Unknown");
    }

    #[test]
    fn test_all_below_threshold_is_unknown() {
        let gallery = vec![
            record("a@x.com", &[0.0, 1.0, 0.0]),
            record("b@x.com", &[0.0, 0.0, 1.0]),
        ];
        let outcome = FirstMatchMatcher.compare(&probe(&[1.0, 0.0, 0.0]), &gallery, 0.7);
        assert!(!outcome.is_match());
    }

    #[test]
    fn test_threshold_is_strict() {
        // cos = 0.6 exactly: [0.6, 0.8] vs [1, 0]
        let gallery = vec![record("a@x.com", &[0.6, 0.8])];
        let p = probe(&[1.0, 0.0]);
        let sim = p.similarity(&gallery[0].embedding);
        assert_eq!(FirstMatchMatcher.compare(&p, &gallery, sim), MatchOutcome::Unknown);
        assert!(FirstMatchMatcher.compare(&p, &gallery, sim - 1e-4).is_match());
    }

    #[test]
    fn test_first_match_wins_over_better_later_match() {
        let gallery = vec![
            record("decoy@x.com", &[0.0, 1.0]),
            record("first@x.com", &[0.9, 0.3]),
            record("best@x.com", &[1.0, 0.0]),
        ];
        let outcome = FirstMatchMatcher.compare(&probe(&[1.0, 0.0]), &gallery, 0.7);
        match outcome {
            MatchOutcome::Match {
                identity,
                similarity,
            } => {
                assert_eq!(identity, "first@x.com");
                assert!(similarity > 0.7 && similarity < 1.0);
            }
            MatchOutcome::Unknown => panic!("expected a match"),
        }
    }

    #[test]
    fn test_zero_norm_never_matches() {
        let gallery = vec![record("a@x.com", &[0.0, 0.0])];
        assert_eq!(
            FirstMatchMatcher.compare(&probe(&[1.0, 0.0]), &gallery, 0.7),
            MatchOutcome::Unknown
        );

        let gallery = vec![record("a@x.com", &[1.0, 0.0])];
        assert_eq!(
            FirstMatchMatcher.compare(&probe(&[0.0, 0.0]), &gallery, 0.0),
            MatchOutcome::Unknown
        );
    }

    #[test]
    fn test_degenerate_pairs_never_match_below_zero_threshold() {
        let gallery = vec![
            record("zero@x.com", &[0.0, 0.0]),
            record("short@x.com", &[1.0]),
        ];
        assert_eq!(
            FirstMatchMatcher.compare(&probe(&[1.0, 0.0]), &gallery, -0.5),
            MatchOutcome::Unknown
        );

        // A real pair still clears a negative threshold.
        let gallery = vec![record("zero@x.com", &[0.0, 0.0]), record("b@x.com", &[0.0, 1.0])];
        assert_eq!(
            FirstMatchMatcher.compare(&probe(&[1.0, 0.0]), &gallery, -0.5).label(),
            "b@x.com"
        );
    }

    #[test]
    fn test_latest_per_identity_keeps_last_row() {
        let gallery = vec![
            record("a@x.com", &[1.0, 0.0]),
            record("b@x.com", &[0.5, 0.5]),
            record("a@x.com", &[0.0, 1.0]),
        ];
        let collapsed = latest_per_identity(gallery);

        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].identity, "a@x.com");
        assert_eq!(collapsed[0].embedding.values, vec![0.0, 1.0]);
        assert_eq!(collapsed[1].identity, "b@x.com");
    }

    #[test]
    fn test_match_label_is_identity() {
        let gallery = vec![record("a@x.com", &[0.2, 0.4, 0.6])];
        let outcome = FirstMatchMatcher.compare(&probe(&[0.2, 0.4, 0.6]), &gallery, 0.7);
        assert_eq!(outcome.label(), "a@x.com");
    }
}
