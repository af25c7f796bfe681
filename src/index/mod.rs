//! Nearest-neighbour index over embedding vectors.
//!
//! The retriever builds one index per request, adds every candidate vector and
//! queries it with the same vectors. Only exact search is provided; candidate
//! sets are capped at 50 so a linear scan is cheap.

use thiserror::Error;

/// Placeholder id for result slots that have no neighbour
/// (fewer stored vectors than `k`).
pub const NO_NEIGHBOR: usize = usize::MAX;

/// Errors that can occur during index operations.
#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    /// A vector did not match the index dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A vector contained NaN or infinite components
    #[error("Vector contains non-finite values")]
    NonFinite,
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Trait for vector similarity indexes.
///
/// Ids are assigned in insertion order starting from 0.
pub trait SimilarityIndex: Send {
    /// Append vectors to the index.
    ///
    /// # Errors
    /// Returns `IndexError` if any vector has the wrong dimension; in that case
    /// nothing is added.
    fn add(&mut self, vectors: &[Vec<f32>]) -> IndexResult<()>;

    /// Return the ids of the `k` nearest stored vectors for each query,
    /// nearest first. Rows are padded with [`NO_NEIGHBOR`] when fewer than `k`
    /// vectors are stored.
    ///
    /// # Errors
    /// Returns `IndexError` if a query has the wrong dimension
    fn search(&self, queries: &[Vec<f32>], k: usize) -> IndexResult<Vec<Vec<usize>>>;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension every stored vector must have.
    fn dimension(&self) -> usize;
}

/// Exact index ranking by squared Euclidean distance.
///
/// Stored vectors whose distance to the query is at most `tolerance` are
/// considered coincident with it and ranked by id instead of distance, so a
/// cluster of near-identical vectors always reports its oldest member first.
/// With a tolerance of zero only exact ties are ordered by id.
#[derive(Debug, Clone)]
pub struct FlatL2Index {
    dimension: usize,
    tolerance: f32,
    vectors: Vec<Vec<f32>>,
}

impl FlatL2Index {
    /// Create an empty index for vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            tolerance: 0.0,
            vectors: Vec::new(),
        }
    }

    /// Set the coincidence tolerance (squared L2 distance). Negative values
    /// are clamped to zero.
    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance.max(0.0);
        self
    }

    fn check(&self, vector: &[f32]) -> IndexResult<()> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(IndexError::NonFinite);
        }
        Ok(())
    }
}

/// Squared Euclidean distance between two equal-length vectors.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl SimilarityIndex for FlatL2Index {
    fn add(&mut self, vectors: &[Vec<f32>]) -> IndexResult<()> {
        for vector in vectors {
            self.check(vector)?;
        }
        self.vectors.extend(vectors.iter().cloned());
        Ok(())
    }

    fn search(&self, queries: &[Vec<f32>], k: usize) -> IndexResult<Vec<Vec<usize>>> {
        let mut rows = Vec::with_capacity(queries.len());

        for query in queries {
            self.check(query)?;

            let mut ranked: Vec<(bool, f32, usize)> = self
                .vectors
                .iter()
                .enumerate()
                .map(|(id, stored)| {
                    let distance = squared_l2(query, stored);
                    (distance > self.tolerance, distance, id)
                })
                .collect();

            ranked.sort_by(|a, b| {
                a.0.cmp(&b.0).then_with(|| {
                    if a.0 {
                        a.1.total_cmp(&b.1).then(a.2.cmp(&b.2))
                    } else {
                        a.2.cmp(&b.2)
                    }
                })
            });

            let mut row: Vec<usize> = ranked.into_iter().take(k).map(|(_, _, id)| id).collect();
            row.resize(k, NO_NEIGHBOR);
            rows.push(row);
        }

        Ok(rows)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dimension: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn test_search_orders_by_distance() {
        let mut index = FlatL2Index::new(3);
        index
            .add(&[unit(3, 0), unit(3, 1), vec![0.9, 0.1, 0.0]])
            .unwrap();
        assert_eq!(index.len(), 3);

        let rows = index.search(&[vec![1.0, 0.0, 0.0]], 3).unwrap();
        assert_eq!(rows, vec![vec![0, 2, 1]]);
    }

    #[test]
    fn test_search_pads_with_sentinel() {
        let mut index = FlatL2Index::new(2);
        index.add(&[unit(2, 0)]).unwrap();

        let rows = index.search(&[unit(2, 0)], 2).unwrap();
        assert_eq!(rows, vec![vec![0, NO_NEIGHBOR]]);

        let empty = FlatL2Index::new(2);
        assert!(empty.is_empty());
        assert_eq!(
            empty.search(&[unit(2, 1)], 2).unwrap(),
            vec![vec![NO_NEIGHBOR, NO_NEIGHBOR]]
        );
    }

    #[test]
    fn test_exact_ties_resolve_to_lowest_id() {
        let mut index = FlatL2Index::new(2);
        index.add(&[unit(2, 0), unit(2, 0)]).unwrap();

        let rows = index.search(&[unit(2, 0), unit(2, 0)], 2).unwrap();
        assert_eq!(rows, vec![vec![0, 1], vec![0, 1]]);
    }

    #[test]
    fn test_tolerance_groups_near_duplicates_by_id() {
        let a = vec![1.0, 0.0];
        let b = vec![0.999, 0.0447];
        let mut index = FlatL2Index::new(2).with_tolerance(0.1);
        index.add(&[a.clone(), b.clone()]).unwrap();

        // Without tolerance `b` would rank itself first.
        let rows = index.search(&[a, b], 2).unwrap();
        assert_eq!(rows, vec![vec![0, 1], vec![0, 1]]);
    }

    #[test]
    fn test_zero_tolerance_keeps_self_first() {
        let a = vec![1.0, 0.0];
        let b = vec![0.999, 0.0447];
        let mut index = FlatL2Index::new(2);
        index.add(&[a.clone(), b.clone()]).unwrap();

        let rows = index.search(&[a, b], 2).unwrap();
        assert_eq!(rows, vec![vec![0, 1], vec![1, 0]]);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = FlatL2Index::new(3);
        let err = index.add(&[unit(3, 0), vec![1.0]]).unwrap_err();
        assert_eq!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        );
        // Nothing is added on failure
        assert!(index.is_empty());

        assert!(index.search(&[vec![0.0; 4]], 1).is_err());
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut index = FlatL2Index::new(2);
        assert_eq!(
            index.add(&[vec![f32::NAN, 0.0]]).unwrap_err(),
            IndexError::NonFinite
        );
    }

    #[test]
    fn test_squared_l2() {
        assert!((squared_l2(&[0.0, 0.0], &[3.0, 4.0]) - 25.0).abs() < 1e-6);
    }
}
