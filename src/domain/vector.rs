//! Vector math used by the similarity search

use super::DomainError;

/// Cosine similarity between two vectors of equal length.
///
/// Fails with [`DomainError::DimensionMismatch`] when the lengths differ and
/// with [`DomainError::DegenerateVector`] when either vector has zero
/// magnitude (an empty vector counts as zero magnitude).
pub fn try_cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, DomainError> {
    if a.len() != b.len() {
        return Err(DomainError::dimension_mismatch(a.len(), b.len()));
    }

    let norm_a = magnitude(a);
    let norm_b = magnitude(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(DomainError::DegenerateVector);
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();

    // Rounding can push identical vectors a hair past 1.0
    Ok((dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Cosine similarity that treats a degenerate vector as "no match" (0.0).
///
/// A dimension mismatch is still an error: it means embeddings from two
/// different models ended up in the same store.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, DomainError> {
    match try_cosine_similarity(a, b) {
        Err(DomainError::DegenerateVector) => Ok(0.0),
        other => other,
    }
}

/// Euclidean norm
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Check that every vector has the same length, returning that length.
///
/// Returns `Ok(None)` for an empty set.
pub fn validate_dimensions<'a, I>(vectors: I) -> Result<Option<usize>, DomainError>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut dimension: Option<usize> = None;

    for vector in vectors {
        match dimension {
            None => dimension = Some(vector.len()),
            Some(expected) if expected != vector.len() => {
                return Err(DomainError::dimension_mismatch(expected, vector.len()));
            }
            Some(_) => {}
        }
    }

    Ok(dimension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let v = vec![0.3, -1.2, 4.5, 0.01];

        let similarity = cosine_similarity(&v, &v).unwrap();

        assert!((similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_symmetric() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-0.5, 4.0, 0.25];

        let ab = cosine_similarity(&a, &b).unwrap();
        let ba = cosine_similarity(&b, &a).unwrap();

        assert_eq!(ab, ba);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let similarity = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(similarity.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let similarity = cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]).unwrap();
        assert!((similarity + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_scale_invariant() {
        let similarity = cosine_similarity(&[1.0, 2.0], &[10.0, 20.0]).unwrap();
        assert!((similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch() {
        let result = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]);

        assert!(matches!(
            result,
            Err(DomainError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_degenerate_vector_strict() {
        let result = try_cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]);
        assert!(matches!(result, Err(DomainError::DegenerateVector)));
    }

    #[test]
    fn test_degenerate_vector_is_no_match() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&[], &[]).unwrap(), 0.0);
    }

    #[test]
    fn test_validate_dimensions() {
        let a = vec![1.0, 2.0];
        let b = vec![3.0, 4.0];
        let c = vec![5.0];

        assert_eq!(
            validate_dimensions([a.as_slice(), b.as_slice()]).unwrap(),
            Some(2)
        );
        assert!(validate_dimensions([a.as_slice(), c.as_slice()]).is_err());
        assert_eq!(validate_dimensions(std::iter::empty::<&[f32]>()).unwrap(), None);
    }
}
