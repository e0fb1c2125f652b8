//! Standard operand initialisation.

use ndarray::ShapeError;

use crate::types::GlobalMatrix;

/// Build the standard operands `A[i,j] = i + j` and `B[i,j] = i - j`.
pub fn standard_operands(n: usize) -> Result<(GlobalMatrix, GlobalMatrix), ShapeError> {
    let a = GlobalMatrix::from_fn(n, |i, j| (i + j) as f64)?;
    let b = GlobalMatrix::from_fn(n, |i, j| i as f64 - j as f64)?;
    Ok((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_operands_n4() {
        let (a, b) = standard_operands(4).unwrap();
        assert_eq!(a.row(0).to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(a.row(3).to_vec(), vec![3.0, 4.0, 5.0, 6.0]);
        assert_eq!(b.row(0).to_vec(), vec![0.0, -1.0, -2.0, -3.0]);
        assert_eq!(b.row(3).to_vec(), vec![3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_standard_operands_empty() {
        let (a, b) = standard_operands(0).unwrap();
        assert_eq!(a.dim(), 0);
        assert_eq!(b.dim(), 0);
    }
}
