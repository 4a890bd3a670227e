//! TF-IDF vectors for spec texts.
//!
//! Terms are unigrams and bigrams of normalized text. Term weights use an
//! inverse *stratum* frequency so that vocabulary shared by every archetype
//! (boilerplate section names, common verbs) carries little weight, while
//! terms that separate items inside one stratum keep theirs.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array2, ArrayView1};

use super::text::{normalize_text, tokenize};

/// Default minimum document frequency for a term to be kept.
pub const DEFAULT_MIN_DF: usize = 2;

/// Default maximum document frequency, as a fraction of documents.
pub const DEFAULT_MAX_DF: f64 = 0.9;

/// A document to vectorize together with the stratum it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct TfidfDocument<'a> {
    pub text: &'a str,
    pub stratum: &'a str,
}

/// Fitted TF-IDF matrix: one L2-normalized row per document.
#[derive(Debug, Clone)]
pub struct TfidfMatrix {
    pub vocabulary: Vec<String>,
    pub matrix: Array2<f64>,
}

/// Unigram + bigram TF-IDF vectorizer with document-frequency pruning.
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    min_df: usize,
    max_df: f64,
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DF, DEFAULT_MAX_DF)
    }
}

impl TfidfVectorizer {
    pub fn new(min_df: usize, max_df: f64) -> Self {
        Self { min_df, max_df }
    }

    /// Unigrams followed by bigrams of the normalized text.
    pub fn terms(text: &str) -> Vec<String> {
        let tokens = tokenize(&normalize_text(text));
        let mut terms = tokens.clone();
        terms.extend(tokens.windows(2).map(|w| format!("{} {}", w[0], w[1])));
        terms
    }

    /// Fits the vocabulary on `docs` and returns their vectors.
    ///
    /// # Arguments
    ///
    /// * `docs` - The whole corpus; every document contributes to document
    ///   and stratum frequencies.
    ///
    /// # Returns
    ///
    /// A matrix with one row per document, in input order.
    pub fn fit_transform(&self, docs: &[TfidfDocument<'_>]) -> TfidfMatrix {
        let n_docs = docs.len();
        let n_strata = docs
            .iter()
            .map(|d| d.stratum)
            .collect::<BTreeSet<_>>()
            .len();

        let counts: Vec<BTreeMap<String, usize>> = docs
            .iter()
            .map(|d| {
                let mut tf = BTreeMap::new();
                for term in Self::terms(d.text) {
                    *tf.entry(term).or_insert(0) += 1;
                }
                tf
            })
            .collect();

        let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();
        let mut stratum_sets: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (tf, doc) in counts.iter().zip(docs) {
            for term in tf.keys() {
                *doc_freq.entry(term.as_str()).or_insert(0) += 1;
                stratum_sets
                    .entry(term.as_str())
                    .or_default()
                    .insert(doc.stratum);
            }
        }

        let max_docs = self.max_df * n_docs as f64;
        let vocabulary: Vec<String> = doc_freq
            .iter()
            .filter(|(_, &df)| df >= self.min_df && df as f64 <= max_docs)
            .map(|(term, _)| (*term).to_string())
            .collect();
        let index: BTreeMap<&str, usize> = vocabulary
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();

        let idf: Vec<f64> = vocabulary
            .iter()
            .map(|term| {
                let sf = stratum_sets.get(term.as_str()).map_or(0, |s| s.len());
                ((1.0 + n_strata as f64) / (1.0 + sf as f64)).ln() + 1.0
            })
            .collect();

        let mut matrix: Array2<f64> = Array2::zeros((n_docs, vocabulary.len()));
        for (row, tf) in counts.iter().enumerate() {
            for (term, &count) in tf {
                if let Some(&col) = index.get(term.as_str()) {
                    matrix[[row, col]] = count as f64 * idf[col];
                }
            }
            let norm = matrix.row(row).iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm > 1e-10 {
                matrix.row_mut(row).mapv_inplace(|x| x / norm);
            }
        }

        TfidfMatrix { vocabulary, matrix }
    }
}

/// Cosine similarity of two rows of the same matrix; 0.0 if either is
/// (near) zero.
fn cosine(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let dot_product = a.dot(&b);
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();

    if norm_a < 1e-10 || norm_b < 1e-10 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Computes the pairwise cosine similarity matrix of the rows of `vectors`.
///
/// The diagonal is 1.0 for non-zero rows and 0.0 for zero rows.
pub fn pairwise_cosine_similarity(vectors: &Array2<f64>) -> Array2<f64> {
    let n = vectors.nrows();
    let mut similarity_matrix = Array2::zeros((n, n));

    for i in 0..n {
        let row_i = vectors.row(i);
        similarity_matrix[[i, i]] = cosine(row_i, row_i);

        for j in (i + 1)..n {
            let sim = cosine(row_i, vectors.row(j));
            similarity_matrix[[i, j]] = sim;
            similarity_matrix[[j, i]] = sim;
        }
    }

    similarity_matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn docs<'a>(items: &'a [(&'a str, &'a str)]) -> Vec<TfidfDocument<'a>> {
        items
            .iter()
            .map(|(text, stratum)| TfidfDocument {
                text: *text,
                stratum: *stratum,
            })
            .collect()
    }

    #[test]
    fn test_terms_include_bigrams() {
        assert_eq!(
            TfidfVectorizer::terms("Post comments now"),
            vec!["post", "comments", "now", "post comments", "comments now"]
        );
    }

    #[test]
    fn test_min_and_max_df_prune_vocabulary() {
        let items = [
            ("common alpha", "a"),
            ("common alpha", "a"),
            ("common beta", "b"),
            ("common gamma", "b"),
        ];
        let fitted = TfidfVectorizer::default().fit_transform(&docs(&items));
        // "common" is in every doc (> 0.9), "beta"/"gamma" in one doc (< 2).
        assert!(fitted.vocabulary.contains(&"alpha".to_string()));
        assert!(fitted.vocabulary.contains(&"common alpha".to_string()));
        assert!(!fitted.vocabulary.contains(&"common".to_string()));
        assert!(!fitted.vocabulary.contains(&"beta".to_string()));
        assert_eq!(fitted.matrix.nrows(), 4);
    }

    #[test]
    fn test_rows_are_unit_length_or_zero() {
        let items = [
            ("red green", "a"),
            ("red blue", "a"),
            ("green blue", "b"),
            ("yellow", "b"),
        ];
        let fitted = TfidfVectorizer::new(2, 1.0).fit_transform(&docs(&items));
        for row in fitted.matrix.rows() {
            let norm = row.iter().map(|x| x * x).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-10 || norm.abs() < 1e-10);
        }
    }

    #[test]
    fn test_stratum_specific_terms_weigh_more() {
        let items = [
            ("shared shared unique", "a"),
            ("shared unique", "a"),
            ("shared other", "b"),
            ("shared other", "b"),
        ];
        let fitted = TfidfVectorizer::new(2, 1.0).fit_transform(&docs(&items));
        let col = |t: &str| fitted.vocabulary.iter().position(|v| v == t).unwrap();
        let row = fitted.matrix.row(1);
        assert!(row[col("unique")] > row[col("shared")]);
    }

    #[test]
    fn test_cosine_identical_orthogonal_and_zero() {
        let a = array![1.0, 0.0];
        let b = array![0.0, 1.0];
        let zero = array![0.0, 0.0];
        assert!((cosine(a.view(), a.view()) - 1.0).abs() < 1e-10);
        assert!(cosine(a.view(), b.view()).abs() < 1e-10);
        assert_eq!(cosine(zero.view(), a.view()), 0.0);
    }

    #[test]
    fn test_pairwise_cosine_similarity() {
        let m = array![[1.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let sim = pairwise_cosine_similarity(&m);
        assert!((sim[[0, 1]] - 1.0).abs() < 1e-10);
        assert!(sim[[0, 2]].abs() < 1e-10);
        assert_eq!(sim[[2, 0]], sim[[0, 2]]);
    }

    #[test]
    fn test_pairwise_zero_row_has_zero_diagonal() {
        let m = array![[0.0, 0.0], [0.5, 0.5]];
        let sim = pairwise_cosine_similarity(&m);
        assert_eq!(sim[[0, 0]], 0.0);
        assert!((sim[[1, 1]] - 1.0).abs() < 1e-10);
        assert_eq!(sim[[0, 1]], 0.0);
    }
}
