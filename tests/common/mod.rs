//! Shared fixtures for integration tests.
//!
//! Generates an oversubscribed candidate pool: 7 candidates per stratum with
//! random text over a seeded vocabulary, so no two candidates are
//! near-duplicates unless a test makes them so.

#![allow(dead_code)]

use golden_forge::storage::{CandidateStore, Stratum, StoreOptions};
use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};

const SYLLABLES: [&str; 16] = [
    "ka", "lo", "mi", "ren", "tu", "sa", "vel", "dor", "pi", "qua", "ne", "ros", "zu", "bex",
    "fin", "gal",
];

/// Candidates generated per stratum.
pub const CANDIDATES_PER_STRATUM: u32 = 7;

/// Word count of each candidate seq: seq 1 SHORT, seq 5 EXTENDED, rest STANDARD.
pub fn words_for(seq: u32) -> usize {
    match seq {
        1 => 300,
        5 => 1200,
        _ => 700,
    }
}

fn vocabulary() -> Vec<String> {
    let mut words = Vec::new();
    for (i, a) in SYLLABLES.iter().enumerate() {
        for (j, b) in SYLLABLES.iter().enumerate() {
            for n in 0..20 {
                words.push(format!("{}{}{}", a, b, i * 400 + j * 20 + n));
            }
        }
    }
    words
}

fn random_text(rng: &mut ChaCha8Rng, vocabulary: &[String], words: usize) -> String {
    let mut text = String::new();
    for i in 0..words {
        if i > 0 {
            text.push(if i % 20 == 0 { '\n' } else { ' ' });
        }
        text.push_str(&vocabulary[rng.random_range(0..vocabulary.len())]);
    }
    text
}

/// One JSON input line per candidate, 7 per stratum of the default grid.
pub fn candidate_lines(seed: u64) -> Vec<Value> {
    candidate_lines_with(seed, words_for)
}

/// Like [`candidate_lines`] with the word count of each seq chosen by `words`.
pub fn candidate_lines_with(seed: u64, words: impl Fn(u32) -> usize) -> Vec<Value> {
    let vocabulary = vocabulary();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut lines = Vec::new();

    for stratum in Stratum::grid(&["en".to_string()]) {
        for seq in 1..=CANDIDATES_PER_STRATUM {
            lines.push(json!({
                "id": format!("cand_{}_{:03}", stratum.key(), seq),
                "archetype": stratum.archetype,
                "complexity": stratum.complexity,
                "locale": stratum.locale,
                "rep": seq,
                "seq": seq,
                "text": random_text(&mut rng, &vocabulary, words(seq)),
            }));
        }
    }
    lines
}

/// Identifier of the fixture candidate for `stratum` and `seq`.
pub fn candidate_id(stratum: &str, seq: u32) -> String {
    format!("cand_{}_{:03}", stratum, seq)
}

/// Copies the text of candidate `from` over candidate `to` in `stratum`.
pub fn duplicate(lines: &mut [Value], stratum: &str, from: u32, to: u32) {
    let source = candidate_id(stratum, from);
    let target = candidate_id(stratum, to);
    let text = lines
        .iter()
        .find(|l| l["id"] == source)
        .map(|l| l["text"].clone())
        .expect("source candidate");
    for line in lines.iter_mut() {
        if line["id"] == target {
            line["text"] = text.clone();
        }
    }
}

/// Rewrites candidates `seqs` of `stratum` around one shared 560-word text.
///
/// A token unique to each candidate follows every fourth shared word, so
/// word shingles overlap too little for dedup while the shared terms are
/// all that survive `min_df` pruning: the rewritten items get identical
/// TF-IDF vectors and land in one cluster. Each text is 700 words.
pub fn collapse_stratum(lines: &mut [Value], stratum: &str, seqs: &[u32], seed: u64) {
    let vocabulary = vocabulary();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let shared: Vec<String> = (0..560)
        .map(|_| vocabulary[rng.random_range(0..vocabulary.len())].clone())
        .collect();

    for &seq in seqs {
        let target = candidate_id(stratum, seq);
        let mut words = Vec::with_capacity(700);
        for (i, chunk) in shared.chunks(4).enumerate() {
            words.extend(chunk.iter().cloned());
            words.push(format!("uq{}x{}", seq, i));
        }
        let text = words.join(" ");
        for line in lines.iter_mut() {
            if line["id"] == target {
                line["text"] = Value::String(text.clone());
            }
        }
    }
}

/// Keeps only the first `keep` candidates of `stratum`.
pub fn truncate_stratum(lines: Vec<Value>, stratum: &str, keep: u32) -> Vec<Value> {
    lines
        .into_iter()
        .filter(|l| {
            l["id"]
                .as_str()
                .and_then(|id| id.strip_prefix(&format!("cand_{}_", stratum)))
                .map_or(true, |seq| seq.parse::<u32>().map_or(true, |s| s <= keep))
        })
        .collect()
}

pub fn to_jsonl(lines: &[Value]) -> String {
    lines
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn store(lines: &[Value]) -> CandidateStore {
    let (store, _) = CandidateStore::from_jsonl_str(&to_jsonl(lines), &StoreOptions::default())
        .expect("fixture loads");
    store
}
