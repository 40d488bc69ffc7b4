use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::shared::constants::MAX_REFERENCE_EMBEDDINGS;

use super::embedding::Embedding;

pub const DEFAULT_EPS: f64 = 0.40;
pub const DEFAULT_MIN_SAMPLES: usize = 2;

/// DBSCAN parameters, in cosine distance. Tuned for ArcFace; another
/// embedding model needs its own values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub eps: f64,
    /// Neighbourhood size (the point itself included) that makes a core point.
    pub min_samples: usize,
    pub max_reference_embeddings: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            eps: DEFAULT_EPS,
            min_samples: DEFAULT_MIN_SAMPLES,
            max_reference_embeddings: MAX_REFERENCE_EMBEDDINGS,
        }
    }
}

/// One embedded face track.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterSample {
    pub track_id: u32,
    pub crop_path: PathBuf,
    pub embedding: Embedding,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterLabel {
    Member(usize),
    Noise,
}

/// A group of tracks believed to be the same person.
#[derive(Clone, Debug)]
pub struct IdentityCluster {
    pub cluster_id: usize,
    /// Never empty; ordered by track id, i.e. by first appearance.
    pub members: Vec<ClusterSample>,
    pub centroid: Embedding,
    /// Members closest to the centroid, closest first.
    pub references: Vec<Embedding>,
    /// Singleton made from a point DBSCAN labelled as noise.
    pub from_noise: bool,
}

impl IdentityCluster {
    /// Temporal median member.
    pub fn representative(&self) -> &ClusterSample {
        &self.members[self.members.len() / 2]
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }
}

pub struct ClusterEngine {
    config: ClusteringConfig,
}

impl ClusterEngine {
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Groups samples into identities. Every usable input ends up in exactly
    /// one cluster: noise points become singleton clusters so a person can
    /// still be registered by hand.
    ///
    /// Dense clusters come first in discovery order, then promoted noise,
    /// both walking samples in track order.
    pub fn cluster(&self, samples: Vec<ClusterSample>) -> Vec<IdentityCluster> {
        let (mut samples, unusable): (Vec<_>, Vec<_>) =
            samples.into_iter().partition(|s| s.embedding.is_usable());
        if !unusable.is_empty() {
            log::warn!("Ignoring {} samples with unusable embeddings", unusable.len());
        }
        samples.sort_by_key(|s| s.track_id);

        let embeddings: Vec<&Embedding> = samples.iter().map(|s| &s.embedding).collect();
        let labels = self.label(&embeddings);

        let mut dense: BTreeMap<usize, Vec<ClusterSample>> = BTreeMap::new();
        let mut noise = Vec::new();
        for (sample, label) in samples.into_iter().zip(labels) {
            match label {
                ClusterLabel::Member(c) => dense.entry(c).or_default().push(sample),
                ClusterLabel::Noise => noise.push(sample),
            }
        }

        log::info!(
            "DBSCAN found {} clusters and {} noise points (eps={}, min_samples={})",
            dense.len(),
            noise.len(),
            self.config.eps,
            self.config.min_samples
        );

        let groups = dense
            .into_values()
            .map(|members| (members, false))
            .chain(noise.into_iter().map(|s| (vec![s], true)));

        groups
            .enumerate()
            .map(|(cluster_id, (members, from_noise))| {
                self.build(cluster_id, members, from_noise)
            })
            .collect()
    }

    /// Plain DBSCAN over cosine distance.
    pub fn label(&self, embeddings: &[&Embedding]) -> Vec<ClusterLabel> {
        let n = embeddings.len();
        let min_samples = self.config.min_samples.max(1);
        let neighbours = |i: usize| -> Vec<usize> {
            (0..n)
                .filter(|&j| embeddings[i].cosine_distance(embeddings[j]) <= self.config.eps)
                .collect()
        };

        let mut labels: Vec<Option<ClusterLabel>> = vec![None; n];
        let mut next_cluster = 0;

        for i in 0..n {
            if labels[i].is_some() {
                continue;
            }
            let seeds = neighbours(i);
            if seeds.len() < min_samples {
                labels[i] = Some(ClusterLabel::Noise);
                continue;
            }

            let cluster = next_cluster;
            next_cluster += 1;
            labels[i] = Some(ClusterLabel::Member(cluster));

            let mut queue: VecDeque<usize> = seeds.into_iter().filter(|&j| j != i).collect();
            while let Some(j) = queue.pop_front() {
                match labels[j] {
                    Some(ClusterLabel::Member(_)) => {}
                    // Border point: joins the cluster but does not expand it.
                    Some(ClusterLabel::Noise) => labels[j] = Some(ClusterLabel::Member(cluster)),
                    None => {
                        labels[j] = Some(ClusterLabel::Member(cluster));
                        let reach = neighbours(j);
                        if reach.len() >= min_samples {
                            queue.extend(reach);
                        }
                    }
                }
            }
        }

        labels
            .into_iter()
            .map(|l| l.unwrap_or(ClusterLabel::Noise))
            .collect()
    }

    fn build(&self, cluster_id: usize, members: Vec<ClusterSample>, from_noise: bool) -> IdentityCluster {
        let centroid = Embedding::mean(members.iter().map(|m| &m.embedding))
            .unwrap_or_else(|| members[members.len() / 2].embedding.clone());

        let mut ranked: Vec<(f64, &Embedding)> = members
            .iter()
            .map(|m| (m.embedding.cosine_distance(&centroid), &m.embedding))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        let references = ranked
            .into_iter()
            .take(self.config.max_reference_embeddings)
            .map(|(_, e)| e.clone())
            .collect();

        IdentityCluster {
            cluster_id,
            members,
            centroid,
            references,
            from_noise,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::collections::HashSet;

    fn sample(track_id: u32, v: &[f32]) -> ClusterSample {
        ClusterSample {
            track_id,
            crop_path: PathBuf::from(format!("{track_id}.jpg")),
            embedding: Embedding::new(v.to_vec()),
        }
    }

    fn engine() -> ClusterEngine {
        ClusterEngine::new(ClusteringConfig::default())
    }

    fn ids(cluster: &IdentityCluster) -> Vec<u32> {
        cluster.members.iter().map(|m| m.track_id).collect()
    }

    /// Two people along the x and y axes plus one stranger along z.
    fn two_people_and_a_stranger() -> Vec<ClusterSample> {
        vec![
            sample(0, &[1.0, 0.05, 0.0]),
            sample(1, &[0.05, 1.0, 0.0]),
            sample(2, &[1.0, -0.05, 0.0]),
            sample(3, &[0.0, 0.0, 1.0]),
            sample(4, &[-0.05, 1.0, 0.0]),
            sample(5, &[1.0, 0.0, 0.02]),
        ]
    }

    #[test]
    fn test_empty_input_gives_no_clusters() {
        assert!(engine().cluster(Vec::new()).is_empty());
    }

    #[test]
    fn test_groups_people_and_promotes_noise() {
        let clusters = engine().cluster(two_people_and_a_stranger());
        assert_eq!(clusters.len(), 3);
        assert_eq!(ids(&clusters[0]), vec![0, 2, 5]);
        assert_eq!(ids(&clusters[1]), vec![1, 4]);
        assert_eq!(ids(&clusters[2]), vec![3]);
        assert!(!clusters[0].from_noise);
        assert!(clusters[2].from_noise);
        let cluster_ids: Vec<usize> = clusters.iter().map(|c| c.cluster_id).collect();
        assert_eq!(cluster_ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_input_order_does_not_change_result() {
        let mut shuffled = two_people_and_a_stranger();
        shuffled.reverse();
        let a: Vec<Vec<u32>> = engine().cluster(two_people_and_a_stranger()).iter().map(ids).collect();
        let b: Vec<Vec<u32>> = engine().cluster(shuffled).iter().map(ids).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_representative_is_temporal_median() {
        let members: Vec<ClusterSample> = [2, 11, 5, 9]
            .iter()
            .map(|&id| sample(id, &[1.0, 0.0]))
            .collect();
        let clusters = engine().cluster(members);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].representative().track_id, 9);

        let three: Vec<ClusterSample> = [4, 1, 7].iter().map(|&id| sample(id, &[0.0, 1.0])).collect();
        assert_eq!(engine().cluster(three)[0].representative().track_id, 4);
    }

    #[test]
    fn test_references_capped_and_closest_first() {
        let members: Vec<ClusterSample> = (0..8)
            .map(|i| sample(i, &[1.0, i as f32 * 0.05]))
            .collect();
        let clusters = engine().cluster(members);
        assert_eq!(clusters.len(), 1);
        let c = &clusters[0];
        assert_eq!(c.references.len(), MAX_REFERENCE_EMBEDDINGS);

        let dists: Vec<f64> = c.references.iter().map(|r| r.cosine_distance(&c.centroid)).collect();
        assert!(dists.windows(2).all(|w| w[0] <= w[1]));
        // the two ends of the fan are furthest from the mean
        let ends = [
            Embedding::new(vec![1.0, 0.0]),
            Embedding::new(vec![1.0, 7.0 * 0.05]),
        ];
        assert!(c.references.iter().all(|r| !ends.contains(r)));
    }

    #[test]
    fn test_centroid_is_member_mean() {
        let clusters = engine().cluster(vec![sample(0, &[1.0, 0.2]), sample(1, &[1.0, 0.0])]);
        assert_relative_eq!(clusters[0].centroid.as_slice()[1], 0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_unusable_embeddings_are_ignored() {
        let clusters = engine().cluster(vec![sample(0, &[0.0, 0.0]), sample(1, &[1.0, 0.0])]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(ids(&clusters[0]), vec![1]);
    }

    #[test]
    fn test_border_point_joins_without_expanding() {
        // Only the 10° point is core; 0° and 20° are border points and
        // 35° is too far from 20° to be pulled in.
        let engine = ClusterEngine::new(ClusteringConfig {
            eps: 0.02,
            min_samples: 3,
            ..ClusteringConfig::default()
        });
        let angle = |deg: f32| {
            let r = deg.to_radians();
            vec![r.cos(), r.sin()]
        };
        let samples = vec![
            sample(0, &angle(0.0)),
            sample(1, &angle(10.0)),
            sample(2, &angle(20.0)),
            sample(3, &angle(35.0)),
        ];
        let clusters = engine.cluster(samples);
        assert_eq!(ids(&clusters[0]), vec![0, 1, 2]);
        assert_eq!(ids(&clusters[1]), vec![3]);
        assert!(clusters[1].from_noise);
    }

    fn pseudo_random_samples(seed: u64, n: u32, dim: usize) -> Vec<ClusterSample> {
        let mut state = seed;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) as f32 / (1u64 << 31) as f32) - 0.5
        };
        (0..n)
            .map(|id| {
                let v: Vec<f32> = (0..dim).map(|_| next()).collect();
                sample(id, &v)
            })
            .collect()
    }

    #[rstest]
    #[case(0.1, 2)]
    #[case(0.4, 2)]
    #[case(0.8, 3)]
    #[case(1.5, 5)]
    fn test_every_sample_lands_in_exactly_one_cluster(#[case] eps: f64, #[case] min_samples: usize) {
        let engine = ClusterEngine::new(ClusteringConfig {
            eps,
            min_samples,
            ..ClusteringConfig::default()
        });
        for seed in [3, 17, 256] {
            let samples = pseudo_random_samples(seed, 40, 4);
            let clusters = engine.cluster(samples);

            let mut seen = HashSet::new();
            for c in &clusters {
                assert!(!c.members.is_empty());
                for m in &c.members {
                    assert!(seen.insert(m.track_id), "track {} in two clusters", m.track_id);
                }
            }
            assert_eq!(seen.len(), 40);
        }
    }
}
