//! Symmetric sparse matrices in coordinate form.
//!
//! Storage holds one triangle; entries are normalized to (row ≥ column) on
//! insertion. When regularization is enabled, the first `dimension` slots are
//! reserved diagonal entries that can be overwritten in place without
//! rebuilding the pattern.

use sprs::{CsMat, TriMat};

/// Symmetric sparse matrix (lower triangle stored, COO).
#[derive(Debug, Clone)]
pub struct SymmetricMatrix {
    dimension: usize,
    row_indices: Vec<usize>,
    column_indices: Vec<usize>,
    values: Vec<f64>,
    use_regularization: bool,
}

impl SymmetricMatrix {
    /// New matrix with capacity for `capacity` entries (plus the diagonal
    /// regularization slots when `use_regularization` is set).
    pub fn with_capacity(dimension: usize, capacity: usize, use_regularization: bool) -> Self {
        let total = capacity + if use_regularization { dimension } else { 0 };
        let mut matrix = SymmetricMatrix {
            dimension,
            row_indices: Vec::with_capacity(total),
            column_indices: Vec::with_capacity(total),
            values: Vec::with_capacity(total),
            use_regularization,
        };
        matrix.initialize_regularization();
        matrix
    }

    /// Zero matrix with no capacity.
    pub fn zero(dimension: usize) -> Self {
        Self::with_capacity(dimension, 0, false)
    }

    fn initialize_regularization(&mut self) {
        if self.use_regularization {
            for index in 0..self.dimension {
                self.push_entry(0.0, index, index);
            }
        }
    }

    /// Dimension of the matrix.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Change the logical dimension (entries are untouched; callers only
    /// shrink/grow when the extra rows and columns are structurally empty).
    pub fn set_dimension(&mut self, dimension: usize) {
        self.dimension = dimension;
    }

    /// Number of stored entries.
    pub fn number_nonzeros(&self) -> usize {
        self.values.len()
    }

    /// Empty the matrix, re-creating the regularization slots.
    pub fn reset(&mut self) {
        self.row_indices.clear();
        self.column_indices.clear();
        self.values.clear();
        self.initialize_regularization();
    }

    fn push_entry(&mut self, element: f64, row: usize, column: usize) {
        self.row_indices.push(row);
        self.column_indices.push(column);
        self.values.push(element);
    }

    /// Insert an entry; the (row, column) pair is normalized into the lower
    /// triangle. Duplicates accumulate in downstream conversions.
    pub fn insert(&mut self, element: f64, row: usize, column: usize) {
        debug_assert!(row < self.dimension && column < self.dimension);
        let (r, c) = if row >= column { (row, column) } else { (column, row) };
        self.push_entry(element, r, c);
    }

    /// Overwrite the reserved diagonal regularization slots.
    pub fn set_regularization(&mut self, regularization: impl Fn(usize) -> f64) {
        assert!(
            self.use_regularization,
            "regularization slots were not reserved for this matrix"
        );
        for index in 0..self.dimension {
            self.values[index] = regularization(index);
        }
    }

    /// Iterate over stored (row, column, value) entries.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.row_indices
            .iter()
            .copied()
            .zip(self.column_indices.iter().copied())
            .zip(self.values.iter().copied())
            .map(|((r, c), v)| (r, c, v))
    }

    /// xᵀ M y, exploiting symmetry. Entries outside `max_dimension` are
    /// ignored so that scratch sized for elastic variables can be reused.
    pub fn quadratic_product(&self, x: &[f64], y: &[f64], max_dimension: usize) -> f64 {
        let mut result = 0.0;
        for (row, column, element) in self.iter() {
            if max_dimension <= row || max_dimension <= column {
                continue;
            }
            if row == column {
                result += element * x[row] * y[row];
            } else {
                result += element * (x[row] * y[column] + x[column] * y[row]);
            }
        }
        result
    }

    /// Smallest diagonal entry among the first `max_dimension` rows. A row
    /// with no stored diagonal term counts as 0.
    pub fn smallest_diagonal_entry(&self, max_dimension: usize) -> f64 {
        let mut diagonal = vec![0.0_f64; max_dimension.min(self.dimension)];
        for (row, column, element) in self.iter() {
            if row == column && row < diagonal.len() {
                diagonal[row] += element;
            }
        }
        diagonal.iter().copied().fold(0.0_f64, f64::min)
    }

    /// Upper-triangle CSC view (duplicates summed, sorted indices, explicit
    /// diagonal on every column), the form the LDL^T backend consumes.
    pub fn to_upper_csc(&self) -> CsMat<f64> {
        let n = self.dimension;
        let mut triplets = TriMat::new((n, n));
        // explicit diagonal so quasi-definite factorizations always find a pivot
        let mut has_diagonal = vec![false; n];
        for (row, column, value) in self.iter() {
            // stored lower triangle; emit upper
            triplets.add_triplet(column, row, value);
            if row == column {
                has_diagonal[row] = true;
            }
        }
        for (index, present) in has_diagonal.iter().enumerate() {
            if !present {
                triplets.add_triplet(index, index, 0.0);
            }
        }
        triplets.to_csc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_product_is_symmetric() {
        // M = [2 1; 1 3]
        let mut m = SymmetricMatrix::with_capacity(2, 3, false);
        m.insert(2.0, 0, 0);
        m.insert(1.0, 0, 1);
        m.insert(3.0, 1, 1);

        let x = vec![1.0, 2.0];
        let y = vec![-1.0, 0.5];
        let xy = m.quadratic_product(&x, &y, 2);
        let yx = m.quadratic_product(&y, &x, 2);
        assert!((xy - yx).abs() < 1e-15);
        // x' M y = [4, 7] . [-1, 0.5] = -4 + 3.5
        assert!((xy + 0.5).abs() < 1e-15);
    }

    #[test]
    fn coo_to_csc_round_trip() {
        let mut m = SymmetricMatrix::with_capacity(3, 4, false);
        m.insert(4.0, 0, 0);
        m.insert(1.0, 2, 0);
        m.insert(-2.0, 1, 1);
        m.insert(5.0, 2, 2);

        let csc = m.to_upper_csc();
        assert_eq!(csc.rows(), 3);
        assert_eq!(csc.cols(), 3);

        // rebuild and compare entry sets (identity modulo ordering)
        let mut rebuilt = SymmetricMatrix::with_capacity(3, 4, false);
        for (&value, (row, column)) in csc.iter() {
            if value != 0.0 {
                rebuilt.insert(value, row, column);
            }
        }
        let mut original: Vec<_> = m.iter().collect();
        let mut round_tripped: Vec<_> = rebuilt.iter().collect();
        original.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        round_tripped.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        assert_eq!(original, round_tripped);
    }

    #[test]
    fn regularization_slots() {
        let mut m = SymmetricMatrix::with_capacity(2, 2, true);
        m.insert(1.0, 1, 0);
        m.set_regularization(|_| 0.5);
        let diagonal: Vec<_> = m.iter().filter(|(r, c, _)| r == c).collect();
        assert_eq!(diagonal, vec![(0, 0, 0.5), (1, 1, 0.5)]);
    }

    #[test]
    fn quadratic_product_ignores_entries_beyond_max_dimension() {
        let mut m = SymmetricMatrix::with_capacity(3, 2, false);
        m.insert(1.0, 0, 0);
        m.insert(100.0, 2, 2);
        let x = vec![1.0, 1.0, 1.0];
        assert_eq!(m.quadratic_product(&x, &x, 2), 1.0);
    }
}
