//! Tensor type for neural network computations.
//!
//! Storage is a row-major `Vec<f32>` plus a shape. Matrix products,
//! reductions, concatenation and slicing go through borrowed [`ndarray`]
//! views, so every operation is shape-checked and returns a [`LayerResult`].
//!
//! Products and sums are evaluated in `f64` and narrowed with [`saturate`],
//! so finite inputs never produce an infinity or a NaN.

use crate::error::{LayerError, LayerResult};
use ndarray::{Array, ArrayView2, ArrayViewD, Axis, Dimension, IxDyn, Slice};
use serde::{Deserialize, Serialize};

/// Narrows an `f64` to `f32`, clamping overflow to `±f32::MAX`.
///
/// ```
/// use deepfm_layers::tensor::saturate;
///
/// assert_eq!(saturate(1e300), f32::MAX);
/// assert_eq!(saturate(-1e300), f32::MIN);
/// assert_eq!(saturate(0.5), 0.5);
/// ```
pub fn saturate(value: f64) -> f32 {
    value.clamp(f64::from(f32::MIN), f64::from(f32::MAX)) as f32
}

/// A multi-dimensional array of `f32` values in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// The shape of the tensor (dimensions)
    shape: Vec<usize>,
    /// The underlying data in row-major order
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a new tensor with the given shape, filled with zeros.
    ///
    /// # Example
    ///
    /// ```
    /// use deepfm_layers::tensor::Tensor;
    ///
    /// let t = Tensor::zeros(&[2, 3]);
    /// assert_eq!(t.shape(), &[2, 3]);
    /// assert_eq!(t.numel(), 6);
    /// ```
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    /// Creates a new tensor with the given shape, filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    /// Creates a new tensor with every element set to `value`.
    pub fn full(shape: &[usize], value: f32) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![value; numel],
        }
    }

    /// Creates a tensor from raw row-major data.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::ShapeMismatch`] if `data.len()` does not equal
    /// the product of `shape`.
    pub fn from_data(shape: &[usize], data: Vec<f32>) -> LayerResult<Self> {
        let numel: usize = shape.iter().product();
        if data.len() != numel {
            return Err(LayerError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![data.len()],
            });
        }
        Ok(Self {
            shape: shape.to_vec(),
            data,
        })
    }

    /// Takes ownership of an ndarray result, re-laying it out row-major.
    pub fn from_array<D: Dimension>(array: Array<f32, D>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Returns the raw row-major data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns the raw row-major data mutably.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consumes the tensor and returns its data.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Returns the size of `axis`.
    pub fn dim(&self, axis: usize) -> LayerResult<usize> {
        self.check_axis(axis)?;
        Ok(self.shape[axis])
    }

    /// Fails unless the tensor has exactly `rank` dimensions.
    pub fn expect_rank(&self, rank: usize) -> LayerResult<()> {
        if self.ndim() != rank {
            return Err(LayerError::RankMismatch {
                expected: rank,
                actual: self.ndim(),
            });
        }
        Ok(())
    }

    fn check_axis(&self, axis: usize) -> LayerResult<()> {
        if axis >= self.ndim() {
            return Err(LayerError::RankMismatch {
                expected: axis + 1,
                actual: self.ndim(),
            });
        }
        Ok(())
    }

    /// Borrows the tensor as a dynamic-rank ndarray view.
    pub fn view(&self) -> LayerResult<ArrayViewD<'_, f32>> {
        Ok(ArrayViewD::from_shape(IxDyn(&self.shape), &self.data)?)
    }

    /// Borrows a rank-2 tensor as a matrix view.
    pub fn view2(&self) -> LayerResult<ArrayView2<'_, f32>> {
        self.expect_rank(2)?;
        Ok(ArrayView2::from_shape(
            (self.shape[0], self.shape[1]),
            &self.data,
        )?)
    }

    /// Returns row `index` of a rank-2 tensor.
    pub fn row(&self, index: usize) -> LayerResult<&[f32]> {
        self.expect_rank(2)?;
        let (rows, cols) = (self.shape[0], self.shape[1]);
        if index >= rows {
            return Err(LayerError::InvalidInputDimension {
                expected: rows,
                actual: index,
            });
        }
        Ok(&self.data[index * cols..(index + 1) * cols])
    }

    /// Matrix multiplication of two rank-2 tensors.
    ///
    /// ```
    /// use deepfm_layers::tensor::Tensor;
    ///
    /// let a = Tensor::from_data(&[1, 2], vec![1.0, 2.0]).unwrap();
    /// let b = Tensor::from_data(&[2, 1], vec![3.0, 4.0]).unwrap();
    /// assert_eq!(a.matmul(&b).unwrap().data(), &[11.0]);
    /// ```
    pub fn matmul(&self, other: &Tensor) -> LayerResult<Tensor> {
        let a = self.view2()?;
        let b = other.view2()?;
        if a.ncols() != b.nrows() {
            return Err(LayerError::ShapeMismatch {
                expected: vec![a.ncols(), b.ncols()],
                actual: other.shape.clone(),
            });
        }
        let product = a.mapv(f64::from).dot(&b.mapv(f64::from));
        Ok(Self::from_array(product.mapv(saturate)))
    }

    /// Transposes a rank-2 tensor.
    pub fn transpose(&self) -> LayerResult<Tensor> {
        Ok(Self::from_array(self.view2()?.t().to_owned()))
    }

    /// Adds a `[cols]` vector to every row of a `[rows, cols]` tensor.
    pub fn add_row_vector(&self, row: &Tensor) -> LayerResult<Tensor> {
        self.expect_rank(2)?;
        let cols = self.shape[1];
        if row.shape != [cols] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![cols],
                actual: row.shape.clone(),
            });
        }
        let mut out = self.clone();
        if cols > 0 {
            for chunk in out.data.chunks_mut(cols) {
                for (o, b) in chunk.iter_mut().zip(&row.data) {
                    *o = saturate(f64::from(*o) + f64::from(*b));
                }
            }
        }
        Ok(out)
    }

    /// Combines two same-shaped tensors element by element.
    pub fn zip_map<F>(&self, other: &Tensor, f: F) -> LayerResult<Tensor>
    where
        F: Fn(f32, f32) -> f32,
    {
        if self.shape != other.shape {
            return Err(LayerError::ShapeMismatch {
                expected: self.shape.clone(),
                actual: other.shape.clone(),
            });
        }
        Ok(Self {
            shape: self.shape.clone(),
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| f(*a, *b))
                .collect(),
        })
    }

    /// Element-wise addition.
    pub fn add(&self, other: &Tensor) -> LayerResult<Tensor> {
        self.zip_map(other, |a, b| saturate(f64::from(a) + f64::from(b)))
    }

    /// Element-wise multiplication.
    pub fn mul(&self, other: &Tensor) -> LayerResult<Tensor> {
        self.zip_map(other, |a, b| saturate(f64::from(a) * f64::from(b)))
    }

    /// Multiplies every element by `scalar`.
    pub fn scale(&self, scalar: f32) -> Tensor {
        self.map(|v| saturate(f64::from(v) * f64::from(scalar)))
    }

    /// Applies `f` to every element.
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().map(|v| f(*v)).collect(),
        }
    }

    /// Sum of all elements.
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Sums along `axis`, removing it from the shape.
    pub fn sum_axis(&self, axis: usize) -> LayerResult<Tensor> {
        self.check_axis(axis)?;
        Ok(Self::from_array(self.view()?.sum_axis(Axis(axis))))
    }

    /// Concatenates tensors along `axis`.
    ///
    /// Zero-width parts are allowed, which keeps optional feature groups
    /// uniform.
    pub fn concat(axis: usize, parts: &[&Tensor]) -> LayerResult<Tensor> {
        let first = parts.first().ok_or_else(|| LayerError::ConfigError {
            message: "cannot concatenate an empty list of tensors".to_string(),
        })?;
        first.check_axis(axis)?;
        let views = parts
            .iter()
            .map(|t| t.view())
            .collect::<LayerResult<Vec<_>>>()?;
        Ok(Self::from_array(ndarray::concatenate(Axis(axis), &views)?))
    }

    /// Returns `len` entries of `axis` starting at `start`.
    pub fn narrow(&self, axis: usize, start: usize, len: usize) -> LayerResult<Tensor> {
        self.check_axis(axis)?;
        let end = start + len;
        if end > self.shape[axis] {
            return Err(LayerError::InvalidInputDimension {
                expected: self.shape[axis],
                actual: end,
            });
        }
        let view = self.view()?;
        Ok(Self::from_array(
            view.slice_axis(Axis(axis), Slice::from(start..end))
                .to_owned(),
        ))
    }

    /// Returns a tensor with the same data and a new shape.
    pub fn reshape(&self, new_shape: &[usize]) -> LayerResult<Tensor> {
        Self::from_data(new_shape, self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(shape: &[usize], data: &[f32]) -> Tensor {
        Tensor::from_data(shape, data.to_vec()).unwrap()
    }

    #[test]
    fn test_tensor_from_data_checks_length() {
        assert!(Tensor::from_data(&[2, 2], vec![1.0, 2.0, 3.0]).is_err());
        let x = t(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(x.numel(), 4);
        assert_eq!(x.row(1).unwrap(), &[3.0, 4.0]);
        assert!(x.row(2).is_err());
    }

    #[test]
    fn test_matmul() {
        let a = t(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = t(&[3, 2], &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), &[2, 2]);
        assert_eq!(c.data(), &[58.0, 64.0, 139.0, 154.0]);

        assert!(a.matmul(&a).is_err());
    }

    #[test]
    fn test_transpose_is_row_major() {
        let a = t(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let at = a.transpose().unwrap();
        assert_eq!(at.shape(), &[3, 2]);
        assert_eq!(at.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_add_row_vector() {
        let a = t(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
        let b = t(&[2], &[10.0, 20.0]);
        assert_eq!(a.add_row_vector(&b).unwrap().data(), &[11.0, 22.0, 13.0, 24.0]);
        assert!(a.add_row_vector(&t(&[3], &[0.0; 3])).is_err());
    }

    #[test]
    fn test_sum_axis() {
        let a = t(&[2, 3, 2], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let s = a.sum_axis(1).unwrap();
        assert_eq!(s.shape(), &[2, 2]);
        assert_eq!(s.data(), &[9.0, 12.0, 27.0, 30.0]);
        assert!(a.sum_axis(3).is_err());
    }

    #[test]
    fn test_concat_and_narrow() {
        let a = t(&[2, 1], &[1.0, 2.0]);
        let empty = Tensor::zeros(&[2, 0]);
        let b = t(&[2, 2], &[3.0, 4.0, 5.0, 6.0]);
        let c = Tensor::concat(1, &[&a, &empty, &b]).unwrap();
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c.data(), &[1.0, 3.0, 4.0, 2.0, 5.0, 6.0]);

        let tail = c.narrow(1, 1, 2).unwrap();
        assert_eq!(tail, b);
        assert!(c.narrow(1, 2, 2).is_err());
        assert!(Tensor::concat(1, &[]).is_err());
    }

    #[test]
    fn test_elementwise_shape_checks() {
        let a = t(&[2], &[1.0, 2.0]);
        let b = t(&[2], &[3.0, 5.0]);
        assert_eq!(a.mul(&b).unwrap().data(), &[3.0, 10.0]);
        assert_eq!(b.add(&a).unwrap().data(), &[4.0, 7.0]);
        assert!(a.add(&t(&[1, 2], &[0.0, 0.0])).is_err());
        assert_eq!(a.scale(2.0).sum(), 6.0);
    }

    #[test]
    fn test_overflow_saturates_instead_of_producing_nan() {
        let big = t(&[1, 2], &[f32::MAX, -f32::MAX]);
        let w = t(&[2, 2], &[3.0, 2.0, 2.0, 3.0]);
        let out = big.matmul(&w).unwrap();
        assert!(out.data().iter().all(|v| v.is_finite()));
        assert_eq!(out.data(), &[f32::MAX, f32::MIN]);

        let row = t(&[2], &[f32::MAX, 1.0]);
        let shifted = big.add_row_vector(&row).unwrap();
        assert_eq!(shifted.data(), &[f32::MAX, -f32::MAX + 1.0]);
        assert_eq!(big.scale(10.0).data(), &[f32::MAX, f32::MIN]);
        assert_eq!(big.mul(&big).unwrap().data(), &[f32::MAX, f32::MAX]);
    }
}
