use serde::{Deserialize, Serialize};

use super::embedding::Embedding;

/// A registered person as the matcher sees them.
///
/// Field names follow the stored student records, so a students file can
/// be read directly as a roster. Unknown fields are ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RosterIdentity {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Centroid of the registration cluster.
    #[serde(default)]
    pub embedding: Option<Embedding>,
    /// Up to five reference views, closest to the centroid first.
    #[serde(default)]
    pub embeddings_list: Vec<Embedding>,
    #[serde(default, rename = "classId", skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
}

impl RosterIdentity {
    /// The views to match against: the reference set when it has usable
    /// members, otherwise the centroid alone.
    pub fn reference_views(&self) -> Vec<&Embedding> {
        let views: Vec<&Embedding> = self
            .embeddings_list
            .iter()
            .filter(|e| e.is_usable())
            .collect();
        if !views.is_empty() {
            return views;
        }
        self.embedding
            .iter()
            .filter(|e| e.is_usable())
            .collect()
    }
}

/// Keeps identities belonging to `class_id`, preserving order.
pub fn filter_by_class(roster: Vec<RosterIdentity>, class_id: &str) -> Vec<RosterIdentity> {
    roster
        .into_iter()
        .filter(|r| r.class_id.as_deref() == Some(class_id))
        .collect()
}
