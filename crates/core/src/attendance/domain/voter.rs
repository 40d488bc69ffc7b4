use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::recognition::domain::embedding::Embedding;
use crate::recognition::domain::matcher::{MatchResult, Matcher};
use crate::recognition::domain::roster::RosterIdentity;

pub const DEFAULT_ACCEPT_THRESHOLD: f64 = 0.40;
pub const DEFAULT_MIN_VOTES: usize = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingPolicy {
    /// A match counts as a vote only when its distance is strictly below this.
    pub accept_threshold: f64,
    /// Votes needed before an identity is marked present. Raise it when
    /// false positives show up.
    pub min_votes: usize,
}

impl Default for VotingPolicy {
    fn default() -> Self {
        Self {
            accept_threshold: DEFAULT_ACCEPT_THRESHOLD,
            min_votes: DEFAULT_MIN_VOTES,
        }
    }
}

/// Outcome for a single query face.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Accepted(MatchResult),
    /// Nearest identity was too far away, or nothing could be matched.
    Rejected(Option<MatchResult>),
}

impl Verdict {
    pub fn nearest(&self) -> Option<&MatchResult> {
        match self {
            Verdict::Accepted(m) => Some(m),
            Verdict::Rejected(m) => m.as_ref(),
        }
    }
}

/// Votes and match distances per identity for one run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VoteTally {
    votes: BTreeMap<String, Vec<f64>>,
}

impl VoteTally {
    pub fn record(&mut self, m: &MatchResult) {
        self.votes
            .entry(m.identity_id.clone())
            .or_default()
            .push(m.distance);
    }

    pub fn votes_for(&self, identity_id: &str) -> usize {
        self.votes.get(identity_id).map_or(0, Vec::len)
    }

    pub fn distances_for(&self, identity_id: &str) -> &[f64] {
        self.votes.get(identity_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Identities with at least one vote.
    pub fn vote_counts(&self) -> BTreeMap<String, usize> {
        self.votes
            .iter()
            .map(|(id, d)| (id.clone(), d.len()))
            .collect()
    }

    /// Roster ids with at least `min_votes` votes, in roster order.
    pub fn present(&self, roster: &[RosterIdentity], min_votes: usize) -> Vec<String> {
        let min_votes = min_votes.max(1);
        roster
            .iter()
            .filter(|r| self.votes_for(&r.id) >= min_votes)
            .map(|r| r.id.clone())
            .collect()
    }
}

pub struct AttendanceVoter {
    policy: VotingPolicy,
}

impl AttendanceVoter {
    pub fn new(policy: VotingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &VotingPolicy {
        &self.policy
    }

    pub fn judge(&self, query: &Embedding, matcher: &Matcher) -> Verdict {
        match matcher.best_match(query) {
            Some(m) if m.distance < self.policy.accept_threshold => Verdict::Accepted(m),
            other => Verdict::Rejected(other),
        }
    }

    /// Judges `query` and records a vote when it is accepted.
    pub fn cast(&self, tally: &mut VoteTally, query: &Embedding, matcher: &Matcher) -> Verdict {
        let verdict = self.judge(query, matcher);
        if let Verdict::Accepted(m) = &verdict {
            tally.record(m);
        }
        verdict
    }

    pub fn tally<'q>(
        &self,
        queries: impl IntoIterator<Item = &'q Embedding>,
        matcher: &Matcher,
    ) -> VoteTally {
        let mut tally = VoteTally::default();
        for query in queries {
            self.cast(&mut tally, query, matcher);
        }
        tally
    }

    pub fn present(&self, tally: &VoteTally, roster: &[RosterIdentity]) -> Vec<String> {
        tally.present(roster, self.policy.min_votes)
    }
}
