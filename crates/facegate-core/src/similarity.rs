//! Cosine similarity scoring and the match decision.

use crate::types::Embedding;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityError {
    #[error("vector has zero magnitude; similarity is undefined")]
    ZeroNorm,
    #[error("vector has a NaN or infinite component")]
    NonFinite,
}

/// Whether `v` can take part in a comparison at all.
pub fn check_scorable(v: &Embedding) -> Result<(), SimilarityError> {
    if !v.is_finite() {
        return Err(SimilarityError::NonFinite);
    }
    if v.norm() == 0.0 {
        return Err(SimilarityError::ZeroNorm);
    }
    Ok(())
}

/// Cosine similarity `dot(a, b) / (|a| * |b|)`, clamped to [-1, 1].
///
/// Accumulates in f64 and always processes every component. Exactly
/// symmetric: `score(a, b) == score(b, a)` bit for bit. Never returns NaN.
pub fn score(a: &Embedding, b: &Embedding) -> Result<f64, SimilarityError> {
    if !a.is_finite() || !b.is_finite() {
        return Err(SimilarityError::NonFinite);
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.values().iter().zip(b.values().iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(SimilarityError::ZeroNorm);
    }

    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// A score matches when it reaches the threshold; the boundary is inclusive.
pub fn decide(score: f64, threshold: f64) -> bool {
    score >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(index: usize) -> Embedding {
        Embedding::from_fn(|i| if i == index { 1.0 } else { 0.0 })
    }

    fn wave(phase: f32) -> Embedding {
        Embedding::from_fn(|i| ((i as f32) * 0.11 + phase).cos())
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let v = wave(0.3);
        assert!((score(&v, &v).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let v = wave(1.7);
        let neg = Embedding::from_fn(|i| -v.values()[i]);
        assert!((score(&v, &neg).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(score(&unit(0), &unit(1)).unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_cosine_similarity_is_symmetric() {
        let a = wave(0.0);
        let b = wave(2.5);
        assert_eq!(
            score(&a, &b).unwrap().to_bits(),
            score(&b, &a).unwrap().to_bits()
        );
    }

    #[test]
    fn test_cosine_similarity_scale_invariant() {
        let a = wave(0.9);
        let scaled = Embedding::from_fn(|i| a.values()[i] * 42.0);
        assert!((score(&a, &scaled).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let zero = Embedding::from_fn(|_| 0.0);
        assert_eq!(score(&zero, &unit(3)), Err(SimilarityError::ZeroNorm));
        assert_eq!(score(&unit(3), &zero), Err(SimilarityError::ZeroNorm));
    }

    #[test]
    fn test_cosine_similarity_non_finite_components() {
        let inf = Embedding::from_fn(|i| if i == 3 { f32::INFINITY } else { 1.0 });
        let nan = Embedding::from_fn(|i| if i == 0 { f32::NAN } else { 1.0 });
        assert_eq!(score(&unit(3), &inf), Err(SimilarityError::NonFinite));
        assert_eq!(score(&nan, &unit(3)), Err(SimilarityError::NonFinite));
    }

    #[test]
    fn test_check_scorable() {
        assert_eq!(check_scorable(&unit(7)), Ok(()));
        assert_eq!(
            check_scorable(&Embedding::from_fn(|_| 0.0)),
            Err(SimilarityError::ZeroNorm)
        );
        assert_eq!(
            check_scorable(&Embedding::from_fn(|i| if i == 1 { f32::NEG_INFINITY } else { 0.0 })),
            Err(SimilarityError::NonFinite)
        );
    }

    #[test]
    fn test_decide_threshold_is_inclusive() {
        assert!(decide(0.75, 0.75));
        assert!(decide(0.9, 0.75));
        assert!(!decide(0.7499, 0.75));
    }

    #[test]
    fn test_decide_nan_never_matches() {
        assert!(!decide(f64::NAN, 0.75));
    }
}
