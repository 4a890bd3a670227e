//! Per-stratum clustering of TF-IDF vectors.
//!
//! Two deterministic methods are available:
//!
//! - **Threshold**: single-linkage; items whose cosine similarity reaches
//!   `min_similarity` share a cluster. No initialisation, no randomness.
//! - **K-means**: k-means++ seeding from a ChaCha8 stream, then bounded Lloyd
//!   iterations. Ties go to the lower cluster index.
//!
//! Both return labels renumbered by first appearance, so `0` is always the
//! cluster of the first item.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use ordered_float::OrderedFloat;
use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::minhash::UnionFind;
use super::tfidf::pairwise_cosine_similarity;

/// Clustering algorithm used by the diversity engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusteringMethod {
    Threshold,
    Kmeans,
}

impl std::fmt::Display for ClusteringMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusteringMethod::Threshold => write!(f, "threshold"),
            ClusteringMethod::Kmeans => write!(f, "kmeans"),
        }
    }
}

/// Single-linkage clustering over cosine similarity.
pub fn threshold_clusters(vectors: &Array2<f64>, min_similarity: f64) -> Vec<usize> {
    let n = vectors.nrows();
    let similarities = pairwise_cosine_similarity(vectors);
    let mut uf = UnionFind::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            if similarities[[i, j]] >= min_similarity {
                uf.union(i, j);
            }
        }
    }
    let roots: Vec<usize> = (0..n).map(|i| uf.find(i)).collect();
    relabel(&roots)
}

/// K-means with k-means++ initialisation.
///
/// # Arguments
///
/// * `vectors` - One row per item.
/// * `k` - Requested cluster count, capped at the number of items.
/// * `max_iterations` - Upper bound on Lloyd iterations.
/// * `seed` - Seed of the initialisation stream.
pub fn kmeans_clusters(
    vectors: &Array2<f64>,
    k: usize,
    max_iterations: usize,
    seed: u64,
) -> Vec<usize> {
    let n = vectors.nrows();
    let k = k.min(n);
    if k == 0 {
        return vec![0; n];
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut centers = init_centers(vectors, k, &mut rng);
    let mut labels = assign(vectors, &centers);

    for _ in 0..max_iterations {
        for (c, center) in centers.iter_mut().enumerate() {
            let members: Vec<usize> = (0..n).filter(|&i| labels[i] == c).collect();
            if members.is_empty() {
                continue;
            }
            let mean = vectors.select(Axis(0), &members).mean_axis(Axis(0));
            if let Some(mean) = mean {
                *center = mean;
            }
        }
        let next = assign(vectors, &centers);
        if next == labels {
            break;
        }
        labels = next;
    }

    relabel(&labels)
}

/// k-means++ seeding: each next center is drawn with probability
/// proportional to its squared distance from the nearest chosen center.
fn init_centers(vectors: &Array2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Vec<Array1<f64>> {
    let n = vectors.nrows();
    let mut chosen = vec![rng.random_range(0..n)];

    while chosen.len() < k {
        let weights: Vec<f64> = (0..n)
            .map(|i| {
                chosen
                    .iter()
                    .map(|&c| squared_distance(vectors.row(i), vectors.row(c)))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = weights.iter().sum();

        let next = if total <= 1e-12 {
            // All remaining points coincide with a center.
            (0..n).find(|i| !chosen.contains(i)).unwrap_or(0)
        } else {
            let target = rng.random::<f64>() * total;
            let mut acc = 0.0;
            let mut pick = n - 1;
            for (i, w) in weights.iter().enumerate() {
                acc += w;
                if acc > target && *w > 0.0 {
                    pick = i;
                    break;
                }
            }
            pick
        };
        chosen.push(next);
    }

    chosen.iter().map(|&c| vectors.row(c).to_owned()).collect()
}

fn assign(vectors: &Array2<f64>, centers: &[Array1<f64>]) -> Vec<usize> {
    vectors
        .rows()
        .into_iter()
        .map(|row| {
            centers
                .iter()
                .enumerate()
                .min_by_key(|(c, center)| (OrderedFloat(squared_distance(row, center.view())), *c))
                .map(|(c, _)| c)
                .unwrap_or(0)
        })
        .collect()
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Renumbers labels by order of first appearance.
pub fn relabel(labels: &[usize]) -> Vec<usize> {
    let mut mapping: Vec<(usize, usize)> = Vec::new();
    labels
        .iter()
        .map(|&label| match mapping.iter().find(|(from, _)| *from == label) {
            Some(&(_, to)) => to,
            None => {
                let to = mapping.len();
                mapping.push((label, to));
                to
            }
        })
        .collect()
}

/// Cluster sizes indexed by label.
pub fn cluster_sizes(labels: &[usize]) -> Vec<usize> {
    let count = labels.iter().max().map_or(0, |&m| m + 1);
    let mut sizes = vec![0; count];
    for &label in labels {
        sizes[label] += 1;
    }
    sizes
}
