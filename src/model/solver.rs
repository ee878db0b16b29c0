//! Gauss-Jordan matrix inversion for the normal equations.
//!
//! `beta = (X'X)^-1 X'y` over feature counts this small makes direct inversion
//! the right tool. Degenerate columns (a feature with no variance, or one fully
//! determined by another) surface as near-zero pivots; those rows are resolved
//! to identity rows so the affected features receive zero coefficients instead
//! of aborting the whole fit.

use ndarray::{Array1, Array2};

use crate::errors::TrainingError;

/// Pivots with absolute value below this are treated as singular.
pub const PIVOT_EPSILON: f64 = 1e-12;

/// Invert a square matrix by Gauss-Jordan elimination with partial pivoting.
pub fn invert(matrix: &Array2<f64>) -> Result<Array2<f64>, TrainingError> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return Err(TrainingError::Solver(format!(
            "cannot invert non-square {}x{} matrix",
            matrix.nrows(),
            matrix.ncols()
        )));
    }

    let width = 2 * n;
    let mut aug = vec![0.0f64; n * width];
    for row in 0..n {
        for col in 0..n {
            aug[row * width + col] = matrix[(row, col)];
        }
        aug[row * width + n + row] = 1.0;
    }

    for col in 0..n {
        // Partial pivot: bring the largest remaining entry of this column up.
        let mut pivot_row = col;
        let mut pivot_abs = aug[col * width + col].abs();
        for row in (col + 1)..n {
            let candidate = aug[row * width + col].abs();
            if candidate > pivot_abs {
                pivot_row = row;
                pivot_abs = candidate;
            }
        }

        if pivot_abs < PIVOT_EPSILON {
            // Singular column: resolve this row to an identity row. The inverse
            // row becomes all zeros, which zeroes the matching coefficient.
            for j in 0..width {
                aug[col * width + j] = if j == col { 1.0 } else { 0.0 };
            }
            continue;
        }

        if pivot_row != col {
            for j in 0..width {
                aug.swap(col * width + j, pivot_row * width + j);
            }
        }

        let pivot = aug[col * width + col];
        for j in 0..width {
            aug[col * width + j] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row * width + col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..width {
                aug[row * width + j] -= factor * aug[col * width + j];
            }
        }
    }

    let mut inverse = Array2::zeros((n, n));
    for row in 0..n {
        for col in 0..n {
            inverse[(row, col)] = aug[row * width + n + col];
        }
    }
    Ok(inverse)
}

/// Solve the normal equations `(X'X) beta = X'y` for `beta`.
pub fn solve_normal_equations(
    xtx: &Array2<f64>,
    xty: &Array1<f64>,
) -> Result<Array1<f64>, TrainingError> {
    let inverse = invert(xtx)?;
    Ok(inverse.dot(xty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn assert_matrix_close(actual: &Array2<f64>, expected: &Array2<f64>) {
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-9, "got {actual:?}, expected {expected:?}");
        }
    }

    #[test]
    fn inverts_a_well_conditioned_matrix() {
        let matrix = arr2(&[[4.0, 7.0], [2.0, 6.0]]);
        let expected = arr2(&[[0.6, -0.7], [-0.2, 0.4]]);
        let inverse = invert(&matrix).unwrap();
        assert_matrix_close(&inverse, &expected);
    }

    #[test]
    fn identity_is_its_own_inverse() {
        let identity = Array2::eye(4);
        let inverse = invert(&identity).unwrap();
        assert_matrix_close(&inverse, &identity);
    }

    #[test]
    fn singular_column_yields_zero_inverse_row() {
        // Second row/column is all zeros, as X'X produces for a feature that
        // normalized to a constant 0.
        let matrix = arr2(&[[2.0, 0.0], [0.0, 0.0]]);
        let inverse = invert(&matrix).unwrap();
        assert!((inverse[(0, 0)] - 0.5).abs() < 1e-12);
        assert_eq!(inverse[(1, 0)], 0.0);
        assert_eq!(inverse[(1, 1)], 0.0);
    }

    #[test]
    fn singular_system_solves_to_zero_coefficient() {
        let xtx = arr2(&[[3.0, 0.0], [0.0, 0.0]]);
        let xty = Array1::from_vec(vec![6.0, 0.0]);
        let beta = solve_normal_equations(&xtx, &xty).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-12);
        assert_eq!(beta[1], 0.0);
    }

    #[test]
    fn pivoting_handles_zero_leading_entry() {
        let matrix = arr2(&[[0.0, 1.0], [1.0, 0.0]]);
        let inverse = invert(&matrix).unwrap();
        let expected = arr2(&[[0.0, 1.0], [1.0, 0.0]]);
        assert_matrix_close(&inverse, &expected);
    }

    #[test]
    fn rejects_non_square_input() {
        let matrix = Array2::zeros((2, 3));
        assert!(invert(&matrix).is_err());
    }
}
