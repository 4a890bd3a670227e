//! MinHash signatures, LSH banding and near-duplicate grouping.
//!
//! Signatures approximate Jaccard similarity over word shingles. Candidate
//! pairs come from LSH band collisions and are then compared on the full
//! signature, so the number of exact comparisons stays close to the number of
//! true near-duplicates.

use std::collections::{BTreeMap, BTreeSet};

use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::integrity::digest::sha256_u64;
use crate::storage::CandidateRecord;

use super::text::text_shingles;

/// Modulus of the universal hash family, the Mersenne prime 2^61 - 1.
pub const MERSENNE_PRIME: u64 = (1 << 61) - 1;

/// Default estimated-Jaccard threshold at which two specs are duplicates.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Default signature length.
pub const DEFAULT_NUM_PERM: usize = 128;

/// Default number of LSH bands.
pub const DEFAULT_BANDS: usize = 32;

/// Default shingle width in words.
pub const DEFAULT_SHINGLE_WIDTH: usize = 3;

/// Parameters of the similarity engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub threshold: f64,
    pub num_perm: usize,
    pub bands: usize,
    pub shingle_width: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            num_perm: DEFAULT_NUM_PERM,
            bands: DEFAULT_BANDS,
            shingle_width: DEFAULT_SHINGLE_WIDTH,
        }
    }
}

impl SimilarityConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.threshold <= 0.0 || self.threshold > 1.0 || self.threshold.is_nan() {
            return Err(format!(
                "similarity threshold must be in (0, 1], got {}",
                self.threshold
            ));
        }
        if self.num_perm == 0 || self.bands == 0 {
            return Err("num_perm and bands must be positive".to_string());
        }
        if self.num_perm % self.bands != 0 {
            return Err(format!(
                "num_perm ({}) must be divisible by bands ({})",
                self.num_perm, self.bands
            ));
        }
        if self.shingle_width == 0 {
            return Err("shingle_width must be positive".to_string());
        }
        Ok(())
    }

    /// Rows per LSH band.
    pub fn rows_per_band(&self) -> usize {
        self.num_perm / self.bands.max(1)
    }
}

/// A MinHash signature: one minimum per hash function.
pub type Signature = Vec<u64>;

/// Seeded family of `k` hash functions `h_i(x) = (a_i * x + b_i) mod p`.
#[derive(Debug, Clone)]
pub struct MinHasher {
    params: Vec<(u64, u64)>,
    shingle_width: usize,
}

impl MinHasher {
    /// Creates a hasher whose coefficients are drawn from a ChaCha8 stream.
    ///
    /// # Arguments
    ///
    /// * `num_perm` - Number of hash functions (signature length).
    /// * `shingle_width` - Words per shingle.
    /// * `seed` - Similarity sub-seed.
    pub fn new(num_perm: usize, shingle_width: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let params = (0..num_perm)
            .map(|_| {
                let a = rng.random_range(1..MERSENNE_PRIME);
                let b = rng.random_range(0..MERSENNE_PRIME);
                (a, b)
            })
            .collect();
        Self {
            params,
            shingle_width,
        }
    }

    pub fn from_config(config: &SimilarityConfig, seed: u64) -> Self {
        Self::new(config.num_perm, config.shingle_width, seed)
    }

    /// Computes the signature of a spec text.
    ///
    /// Text with no tokens after normalization gets an all-`u64::MAX`
    /// signature, which [`estimate_similarity`] never matches.
    pub fn signature(&self, text: &str) -> Signature {
        let hashes: BTreeSet<u64> = text_shingles(text, self.shingle_width)
            .iter()
            .map(|s| sha256_u64(s.as_bytes()))
            .collect();

        let mut signature = vec![u64::MAX; self.params.len()];
        for x in hashes {
            for (slot, &(a, b)) in signature.iter_mut().zip(&self.params) {
                let h = universal_hash(a, b, x);
                if h < *slot {
                    *slot = h;
                }
            }
        }
        signature
    }
}

fn universal_hash(a: u64, b: u64, x: u64) -> u64 {
    let p = MERSENNE_PRIME as u128;
    ((a as u128 * (x as u128 % p) + b as u128) % p) as u64
}

/// Estimates Jaccard similarity as the fraction of agreeing positions.
///
/// Returns 0.0 for signatures of different lengths or empty signatures, and
/// treats positions where both sides are `u64::MAX` (no shingles) as
/// disagreeing.
pub fn estimate_similarity(a: &[u64], b: &[u64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let matches = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x == y && **x != u64::MAX)
        .count();
    matches as f64 / a.len() as f64
}

/// Disjoint-set forest over arena indices.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    /// Merges the sets of `a` and `b`; returns false if already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }
}

/// A pair of records whose estimated similarity reached the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarPair {
    pub left: usize,
    pub right: usize,
    pub similarity: f64,
}

/// A connected component of near-duplicate records.
///
/// `members` are indices into the record slice the index was built from,
/// ordered by the record ordering key.
#[derive(Debug, Clone, PartialEq)]
pub struct NearDuplicateGroup {
    pub members: Vec<usize>,
}

/// Signatures for a record slice, stored in a parallel arena.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    signatures: Vec<Signature>,
    bands: usize,
}

impl SimilarityIndex {
    /// Builds signatures for every record, in slice order.
    pub fn build(hasher: &MinHasher, bands: usize, records: &[CandidateRecord]) -> Self {
        let signatures = records.iter().map(|r| hasher.signature(&r.spec)).collect();
        Self {
            signatures,
            bands: bands.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn signature(&self, idx: usize) -> &[u64] {
        &self.signatures[idx]
    }

    pub fn similarity(&self, i: usize, j: usize) -> f64 {
        estimate_similarity(&self.signatures[i], &self.signatures[j])
    }

    /// Index pairs `(i, j)` with `i < j` that share at least one LSH band.
    pub fn candidate_pairs(&self) -> BTreeSet<(usize, usize)> {
        let mut buckets: BTreeMap<(usize, &[u64]), Vec<usize>> = BTreeMap::new();
        for (idx, signature) in self.signatures.iter().enumerate() {
            if signature.iter().all(|&h| h == u64::MAX) {
                continue;
            }
            let rows = (signature.len() / self.bands).max(1);
            for (band, chunk) in signature.chunks(rows).enumerate() {
                buckets.entry((band, chunk)).or_default().push(idx);
            }
        }

        let mut pairs = BTreeSet::new();
        for members in buckets.values() {
            for (pos, &i) in members.iter().enumerate() {
                for &j in &members[pos + 1..] {
                    pairs.insert((i.min(j), i.max(j)));
                }
            }
        }
        pairs
    }

    /// Candidate pairs whose full-signature similarity reaches `threshold`.
    pub fn similar_pairs(&self, threshold: f64) -> Vec<SimilarPair> {
        self.candidate_pairs()
            .into_iter()
            .filter_map(|(left, right)| {
                let similarity = self.similarity(left, right);
                (similarity >= threshold).then_some(SimilarPair {
                    left,
                    right,
                    similarity,
                })
            })
            .collect()
    }

    /// Groups records into near-duplicate components of two or more members.
    ///
    /// The result depends only on the record set: members are sorted by the
    /// ordering key and groups by their first member.
    pub fn cluster(&self, records: &[CandidateRecord], threshold: f64) -> Vec<NearDuplicateGroup> {
        let mut uf = UnionFind::new(self.signatures.len());
        for pair in self.similar_pairs(threshold) {
            uf.union(pair.left, pair.right);
        }

        let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for idx in 0..self.signatures.len() {
            let root = uf.find(idx);
            components.entry(root).or_default().push(idx);
        }

        let mut groups: Vec<NearDuplicateGroup> = components
            .into_values()
            .filter(|members| members.len() > 1)
            .map(|mut members| {
                members.sort_by(|&a, &b| records[a].order_key().cmp(&records[b].order_key()));
                NearDuplicateGroup { members }
            })
            .collect();
        groups.sort_by(|a, b| {
            records[a.members[0]]
                .order_key()
                .cmp(&records[b.members[0]].order_key())
        });
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::Band;
    use crate::storage::{Archetype, Complexity, RecordStatus};

    fn record(id: &str, seq: u32, text: &str) -> CandidateRecord {
        CandidateRecord {
            candidate_id: id.to_string(),
            slot_id: id.to_string(),
            archetype: Archetype::Blog,
            complexity: Complexity::Mvp,
            locale: "en".to_string(),
            platform: "replit".to_string(),
            rep: 1,
            seq,
            spec: text.to_string(),
            token_count: 300,
            length_band: Band::Short,
            status: RecordStatus::Valid,
        }
    }

    fn words(prefix: &str, n: usize) -> String {
        (0..n)
            .map(|i| format!("{}{}", prefix, i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_config_validation() {
        assert!(SimilarityConfig::default().validate().is_ok());
        let bad = SimilarityConfig {
            bands: 30,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        assert_eq!(SimilarityConfig::default().rows_per_band(), 4);
    }

    #[test]
    fn test_signature_is_deterministic_per_seed() {
        let text = words("w", 50);
        let a = MinHasher::new(128, 3, 7).signature(&text);
        let b = MinHasher::new(128, 3, 7).signature(&text);
        let c = MinHasher::new(128, 3, 8).signature(&text);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 128);
    }

    #[test]
    fn test_identical_texts_have_similarity_one() {
        let hasher = MinHasher::new(128, 3, 1);
        let text = words("w", 40);
        let sim = estimate_similarity(&hasher.signature(&text), &hasher.signature(&text));
        assert!((sim - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_disjoint_texts_have_low_similarity() {
        let hasher = MinHasher::new(128, 3, 1);
        let sim = estimate_similarity(
            &hasher.signature(&words("alpha", 60)),
            &hasher.signature(&words("beta", 60)),
        );
        assert!(sim < 0.1);
    }

    #[test]
    fn test_empty_text_never_matches() {
        let hasher = MinHasher::new(16, 3, 1);
        let empty = hasher.signature("");
        assert_eq!(estimate_similarity(&empty, &empty), 0.0);
        assert_eq!(estimate_similarity(&[], &[]), 0.0);
        assert_eq!(estimate_similarity(&[1, 2], &[1]), 0.0);
    }

    #[test]
    fn test_union_find() {
        let mut uf = UnionFind::new(5);
        assert!(uf.union(0, 1));
        assert!(uf.union(3, 4));
        assert!(!uf.union(1, 0));
        assert_eq!(uf.find(0), uf.find(1));
        assert_ne!(uf.find(1), uf.find(3));
        uf.union(1, 4);
        assert_eq!(uf.find(0), uf.find(3));
        assert_ne!(uf.find(2), uf.find(0));
    }

    #[test]
    fn test_cluster_groups_near_duplicates_only() {
        let base = words("w", 200);
        let near = format!("{} extra", base);
        let records = vec![
            record("c", 3, &near),
            record("a", 1, &words("x", 200)),
            record("b", 2, &base),
        ];
        let hasher = MinHasher::new(128, 3, 2025);
        let index = SimilarityIndex::build(&hasher, 32, &records);
        let groups = index.cluster(&records, 0.85);
        assert_eq!(groups.len(), 1);
        // Ordered by seq: b (seq 2) before c (seq 3).
        assert_eq!(groups[0].members, vec![2, 0]);
    }

    #[test]
    fn test_cluster_is_order_independent() {
        let base = words("w", 150);
        let texts = [
            ("a", 1, base.clone()),
            ("b", 2, words("y", 150)),
            ("c", 3, format!("{} tail", base)),
        ];
        let forward: Vec<CandidateRecord> =
            texts.iter().map(|(id, s, t)| record(id, *s, t)).collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        let hasher = MinHasher::new(128, 3, 9);
        let ids = |records: &[CandidateRecord]| -> Vec<Vec<String>> {
            let index = SimilarityIndex::build(&hasher, 32, records);
            index
                .cluster(records, 0.85)
                .iter()
                .map(|g| {
                    g.members
                        .iter()
                        .map(|&i| records[i].candidate_id.clone())
                        .collect()
                })
                .collect()
        };
        assert_eq!(ids(&forward), ids(&reversed));
        assert_eq!(ids(&forward), vec![vec!["a".to_string(), "c".to_string()]]);
    }
}
