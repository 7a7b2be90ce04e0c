//! Deterministic text embedder shared by corpus construction and queries.
//!
//! Feature hashing over lowercase word unigrams and bigrams: each feature is
//! SHA-256 hashed into one of `dim` signed buckets, then the vector is
//! L2-normalized. No model weights, no I/O; the same text always produces a
//! bit-identical vector.

use sha2::{Digest, Sha256};

use crate::error::{McpError, Result};

/// Dimensionality of every vector in the corpus space.
pub const EMBEDDING_DIM: usize = 256;

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct Embedder {
    dim: usize,
}

impl Default for Embedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

impl Embedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Encodes `text` into the corpus vector space.
    ///
    /// Fails on empty or whitespace-only input; text with no word characters
    /// at all embeds to the zero vector, which ranks at zero similarity
    /// against everything.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(McpError::Embedding("empty query text".to_string()));
        }

        let tokens = tokenize(text);
        let mut vector = vec![0f32; self.dim];
        for token in &tokens {
            self.add_feature(&mut vector, &format!("t:{token}"), UNIGRAM_WEIGHT);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("b:{}_{}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        let norm = vector.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v = (*v as f64 / norm) as f32;
            }
        }
        Ok(vector)
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(head) as usize) % self.dim;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

/// Lowercase alphanumeric word runs, in input order.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_is_deterministic() {
        let embedder = Embedder::default();
        let a = embedder.embed("list all my EC2 instances").unwrap();
        let b = embedder.embed("list all my EC2 instances").unwrap();
        // Bit-identical, not just approximately equal.
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIM);
    }

    #[test]
    fn embedding_is_normalized() {
        let embedder = Embedder::default();
        let v = embedder.embed("create an s3 bucket with versioning").unwrap();
        let norm = v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn rejects_empty_input() {
        let embedder = Embedder::default();
        assert!(matches!(embedder.embed(""), Err(McpError::Embedding(_))));
        assert!(matches!(embedder.embed("   \t"), Err(McpError::Embedding(_))));
    }

    #[test]
    fn different_texts_differ() {
        let embedder = Embedder::default();
        let a = embedder.embed("terminate ec2 instances").unwrap();
        let b = embedder.embed("list s3 buckets").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tokenizer_splits_on_punctuation() {
        assert_eq!(
            tokenize("List all, my EC2-instances!"),
            vec!["list", "all", "my", "ec2", "instances"]
        );
    }
}
