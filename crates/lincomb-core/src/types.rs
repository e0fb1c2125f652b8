//! Matrix containers shared across the distribution pipeline.
//!
//! [`GlobalMatrix`] is the full $N \times N$ operand or result and only ever
//! lives on the coordinator. [`LocalBlock`] is the run of whole columns a
//! single rank owns for one round.

use std::borrow::Cow;
use std::ops::Range;

use ndarray::{s, Array2, ArrayView1, ArrayView2, ShapeBuilder, ShapeError};
use rayon::prelude::*;

/// A dense square matrix held by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalMatrix {
    data: Array2<f64>,
}

impl GlobalMatrix {
    /// An `n x n` matrix of zeros.
    pub fn zeros(n: usize) -> Self {
        Self {
            data: Array2::zeros((n, n)),
        }
    }

    /// Fill an `n x n` matrix in parallel from `fill_fn(row, col)`.
    pub fn from_fn(
        n: usize,
        fill_fn: impl Fn(usize, usize) -> f64 + Send + Sync,
    ) -> Result<Self, ShapeError> {
        let values: Vec<f64> = (0..n * n)
            .into_par_iter()
            .map(|idx| fill_fn(idx / n, idx % n))
            .collect();
        Ok(Self {
            data: Array2::from_shape_vec((n, n), values)?,
        })
    }

    /// Wrap an existing array, which must be square.
    pub fn from_array(data: Array2<f64>) -> Option<Self> {
        let (rows, cols) = data.dim();
        (rows == cols).then_some(Self { data })
    }

    /// Matrix dimension `N`.
    pub fn dim(&self) -> usize {
        self.data.nrows()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[[row, col]]
    }

    pub fn row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.data.row(row)
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }

    /// Flatten the columns in `cols` column-major: column `cols.start`'s `N`
    /// values first, then the next column, and so on.
    pub fn pack_columns(&self, cols: Range<usize>) -> Vec<f64> {
        self.data.slice(s![.., cols]).t().iter().copied().collect()
    }

    /// Overwrite column `col` with `values`.
    pub(crate) fn write_column(&mut self, col: usize, values: &[f64]) {
        self.data
            .column_mut(col)
            .assign(&ArrayView1::from(values));
    }
}

/// A contiguous run of whole columns owned by one rank for one round.
///
/// Stored column-major so the packed form is exactly what travels over the
/// transport.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalBlock {
    first_col: usize,
    data: Array2<f64>,
}

impl LocalBlock {
    /// Rebuild a block of `rows x cols` from column-major `values`.
    pub fn from_packed(
        rows: usize,
        first_col: usize,
        cols: usize,
        values: Vec<f64>,
    ) -> Result<Self, ShapeError> {
        Ok(Self {
            first_col,
            data: Array2::from_shape_vec((rows, cols).f(), values)?,
        })
    }

    pub(crate) fn from_array(first_col: usize, data: Array2<f64>) -> Self {
        Self { first_col, data }
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Number of scalars in the block.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Global index of the block's first column.
    pub fn first_col(&self) -> usize {
        self.first_col
    }

    /// Global column range covered by the block.
    pub fn columns(&self) -> Range<usize> {
        self.first_col..self.first_col + self.cols()
    }

    /// Value at `row` and block-local column `col`.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[[row, col]]
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Column-major values, borrowed when the storage already is.
    pub fn packed(&self) -> Cow<'_, [f64]> {
        let columns = self.data.t();
        match columns.to_slice() {
            Some(values) => Cow::Borrowed(values),
            None => Cow::Owned(columns.iter().copied().collect()),
        }
    }
}
