//! Nearest-neighbor ranking over the corpus index.
//!
//! Exact brute-force cosine scan. The catalog tops out at a few thousand
//! commands, so a linear pass is faster to verify and fast enough to serve.

use crate::corpus::{CommandSpec, CorpusIndex};
use crate::error::{McpError, Result};

/// A ranked corpus hit. Borrows its spec from the index it was ranked
/// against, so a candidate can never outlive or dangle from its corpus.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub spec: &'a CommandSpec,
    pub score: f32,
}

/// Returns the top-`k` corpus entries closest to `query`, descending by
/// cosine similarity. Ties keep corpus insertion order. `k` larger than the
/// corpus clamps to the corpus size; an empty corpus is an error.
pub fn rank<'a>(index: &'a CorpusIndex, query: &[f32], k: usize) -> Result<Vec<Candidate<'a>>> {
    if index.is_empty() {
        return Err(McpError::EmptyCorpus);
    }

    let mut scored: Vec<(usize, f32)> = index
        .entries()
        .iter()
        .enumerate()
        .map(|(i, entry)| (i, cosine_similarity(query, &entry.embedding)))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(k.min(index.len()));

    Ok(scored
        .into_iter()
        .map(|(i, score)| Candidate {
            spec: &index.entries()[i].spec,
            score,
        })
        .collect())
}

/// Cosine similarity; 0.0 when either vector has zero norm.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += *x as f64 * *y as f64;
        norm_a += (*x as f64).powi(2);
        norm_b += (*y as f64).powi(2);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::CorpusIndex;
    use crate::embedder::Embedder;

    fn small_index(embedder: &Embedder) -> CorpusIndex {
        let table = r#"{
            "version": "test",
            "commands": [
                {"service": "ec2", "operation": "describe-instances",
                 "description": "Describes the specified instances or all instances",
                 "access": "read", "parameters": []},
                {"service": "s3api", "operation": "list-buckets",
                 "description": "Returns a list of all buckets",
                 "access": "read", "parameters": []},
                {"service": "lambda", "operation": "list-functions",
                 "description": "Returns a list of Lambda functions",
                 "access": "read", "parameters": []}
            ]
        }"#;
        CorpusIndex::build(table, embedder).unwrap()
    }

    #[test]
    fn k_clamps_to_corpus_size() {
        let embedder = Embedder::default();
        let index = small_index(&embedder);
        let query = embedder.embed("anything at all").unwrap();
        let candidates = rank(&index, &query, 5).unwrap();
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn results_are_sorted_descending() {
        let embedder = Embedder::default();
        let index = small_index(&embedder);
        let query = embedder.embed("list my s3 buckets").unwrap();
        let candidates = rank(&index, &query, 3).unwrap();
        for pair in candidates.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(candidates[0].spec.service, "s3api");
    }

    #[test]
    fn ranking_is_idempotent() {
        let embedder = Embedder::default();
        let index = CorpusIndex::build_builtin(&embedder).unwrap();
        let query = embedder.embed("show cloudwatch alarms in alarm state").unwrap();
        let first: Vec<(String, String, f32)> = rank(&index, &query, 10)
            .unwrap()
            .iter()
            .map(|c| (c.spec.service.clone(), c.spec.operation.clone(), c.score))
            .collect();
        let second: Vec<(String, String, f32)> = rank(&index, &query, 10)
            .unwrap()
            .iter()
            .map(|c| (c.spec.service.clone(), c.spec.operation.clone(), c.score))
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_corpus_is_an_error() {
        let embedder = Embedder::default();
        let index = CorpusIndex::empty_for_tests();
        let query = embedder.embed("anything").unwrap();
        assert!(matches!(rank(&index, &query, 3), Err(McpError::EmptyCorpus)));
    }

    #[test]
    fn zero_norm_query_scores_zero_in_insertion_order() {
        let embedder = Embedder::default();
        let index = small_index(&embedder);
        let query = vec![0f32; embedder.dim()];
        let candidates = rank(&index, &query, 2).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].score, 0.0);
        assert_eq!(candidates[0].spec.service, "ec2");
        assert_eq!(candidates[1].spec.service, "s3api");
    }

    #[test]
    fn describe_instances_ranks_high_for_instance_listing() {
        let embedder = Embedder::default();
        let index = CorpusIndex::build_builtin(&embedder).unwrap();
        let query = embedder.embed("list all my EC2 instances").unwrap();
        let candidates = rank(&index, &query, 5).unwrap();
        assert!(
            candidates
                .iter()
                .any(|c| c.spec.service == "ec2" && c.spec.operation == "describe-instances"),
            "expected ec2 describe-instances in top 5, got {:?}",
            candidates
                .iter()
                .map(|c| c.spec.cli_template())
                .collect::<Vec<_>>()
        );
    }
}
