use serde::{Deserialize, Serialize};

/// Norms below this are treated as zero; such vectors never match anything.
pub const NORM_EPSILON: f64 = 1e-6;

/// A face identity vector.
///
/// Serialized as a bare JSON array so stored student records round-trip.
/// Only comparable with embeddings produced by the same model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn norm(&self) -> f64 {
        self.0
            .iter()
            .map(|&x| (x as f64) * (x as f64))
            .sum::<f64>()
            .sqrt()
    }

    /// Non-empty, all finite, and with a non-degenerate norm.
    pub fn is_usable(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|x| x.is_finite()) && self.norm() >= NORM_EPSILON
    }

    pub fn l2_normalize(&mut self) {
        let norm = self.norm();
        if norm >= NORM_EPSILON {
            for x in self.0.iter_mut() {
                *x = (*x as f64 / norm) as f32;
            }
        }
    }

    /// `1 − (a·b)/(‖a‖‖b‖)`, in `[0, 2]`.
    ///
    /// Mismatched dimensions or a near-zero norm on either side give 1.0.
    pub fn cosine_distance(&self, other: &Embedding) -> f64 {
        if self.0.len() != other.0.len() {
            return 1.0;
        }
        let na = self.norm();
        let nb = other.norm();
        if na < NORM_EPSILON || nb < NORM_EPSILON {
            return 1.0;
        }
        let dot: f64 = self
            .0
            .iter()
            .zip(&other.0)
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum();
        (1.0 - dot / (na * nb)).clamp(0.0, 2.0)
    }

    /// Element-wise mean. `None` for no input or mixed dimensions.
    pub fn mean<'a>(embeddings: impl IntoIterator<Item = &'a Embedding>) -> Option<Embedding> {
        let mut iter = embeddings.into_iter();
        let first = iter.next()?;
        let mut sum: Vec<f64> = first.0.iter().map(|&x| x as f64).collect();
        let mut count = 1usize;
        for e in iter {
            if e.0.len() != sum.len() {
                return None;
            }
            for (s, &x) in sum.iter_mut().zip(&e.0) {
                *s += x as f64;
            }
            count += 1;
        }
        Some(Embedding(
            sum.into_iter().map(|s| (s / count as f64) as f32).collect(),
        ))
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}
