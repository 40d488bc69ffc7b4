use super::embedding::Embedding;
use super::roster::RosterIdentity;

#[derive(Clone, Debug, PartialEq)]
pub struct MatchResult {
    pub identity_id: String,
    pub distance: f64,
}

/// Nearest-identity lookup over a roster.
///
/// Every stored view of every identity is compared and the single closest
/// view wins; views are never averaged.
pub struct Matcher {
    identities: Vec<(String, Vec<Embedding>)>,
}

impl Matcher {
    pub fn new(roster: &[RosterIdentity]) -> Self {
        let identities = roster
            .iter()
            .filter_map(|r| {
                let views: Vec<Embedding> = r.reference_views().into_iter().cloned().collect();
                if views.is_empty() {
                    log::debug!("roster identity {} has no usable embeddings", r.id);
                    None
                } else {
                    Some((r.id.clone(), views))
                }
            })
            .collect();
        Self { identities }
    }

    /// Identities with at least one usable view.
    pub fn matchable_count(&self) -> usize {
        self.identities.len()
    }

    /// `None` for an empty roster or a roster with no usable views. An
    /// unusable query is at the maximal distance 1.0 from everything. Ties go
    /// to the earlier roster entry.
    pub fn best_match(&self, query: &Embedding) -> Option<MatchResult> {
        let usable = query.is_usable();
        let mut best: Option<(&str, f64)> = None;
        for (id, views) in &self.identities {
            for view in views {
                let distance = if usable {
                    query.cosine_distance(view)
                } else {
                    1.0
                };
                if best.map_or(true, |(_, d)| distance < d) {
                    best = Some((id.as_str(), distance));
                }
            }
        }

        best.map(|(id, distance)| MatchResult {
            identity_id: id.to_string(),
            distance,
        })
    }
}
