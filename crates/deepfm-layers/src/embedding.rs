//! Embedding tables.
//!
//! An [`EmbeddingTable`] is a dense `[num_rows, dim]` matrix addressed by row
//! index. Lookups gather rows; the backward pass scatters gradients back into
//! a sparse per-row accumulator, so only rows touched by a batch are updated.

use std::collections::BTreeMap;

use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;
use crate::tensor::Tensor;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A named embedding matrix with sparse gradient accumulation.
///
/// # Example
///
/// ```
/// use deepfm_layers::embedding::EmbeddingTable;
/// use deepfm_layers::initializer::Initializer;
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(0);
/// let table = EmbeddingTable::new("feats_emb", 10, 4, Initializer::GlorotNormal, &mut rng).unwrap();
/// let out = table.lookup(&[3, 7], &[1, 2]).unwrap();
/// assert_eq!(out.shape(), &[1, 2, 4]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingTable {
    name: String,
    dim: usize,
    /// Row-major `[num_rows, dim]`
    weights: Tensor,
    #[serde(skip)]
    grads: BTreeMap<usize, Vec<f32>>,
}

impl EmbeddingTable {
    /// Creates a table of `num_rows` rows of width `dim`.
    pub fn new<R: Rng + ?Sized>(
        name: impl Into<String>,
        num_rows: usize,
        dim: usize,
        init: Initializer,
        rng: &mut R,
    ) -> LayerResult<Self> {
        let name = name.into();
        if num_rows == 0 || dim == 0 {
            return Err(LayerError::ConfigError {
                message: format!("embedding table '{name}' needs positive shape, got {num_rows}x{dim}"),
            });
        }
        let weights = init.initialize(&[num_rows, dim], rng)?;
        Ok(Self {
            name,
            dim,
            weights,
            grads: BTreeMap::new(),
        })
    }

    /// Wraps an existing `[num_rows, dim]` matrix.
    pub fn from_weights(name: impl Into<String>, weights: Tensor) -> LayerResult<Self> {
        weights.expect_rank(2)?;
        let dim = weights.shape()[1];
        Ok(Self {
            name: name.into(),
            dim,
            weights,
            grads: BTreeMap::new(),
        })
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.weights.shape()[0]
    }

    /// Row width.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The full weight matrix.
    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    /// Replaces the weights with `data`, which must keep the table shape.
    pub fn load_weights(&mut self, data: Vec<f32>) -> LayerResult<()> {
        self.weights = Tensor::from_data(self.weights.shape(), data)?;
        self.grads.clear();
        Ok(())
    }

    fn check_index(&self, index: usize) -> LayerResult<()> {
        if index >= self.num_rows() {
            return Err(LayerError::IndexOutOfRange {
                table: self.name.clone(),
                index,
                rows: self.num_rows(),
            });
        }
        Ok(())
    }

    /// Borrows one row.
    pub fn row(&self, index: usize) -> LayerResult<&[f32]> {
        self.check_index(index)?;
        Ok(&self.weights.data()[index * self.dim..(index + 1) * self.dim])
    }

    /// Borrows one row mutably.
    pub fn row_mut(&mut self, index: usize) -> LayerResult<&mut [f32]> {
        self.check_index(index)?;
        let dim = self.dim;
        Ok(&mut self.weights.data_mut()[index * dim..(index + 1) * dim])
    }

    /// Gathers rows for `ids`, laid out as `shape` followed by `dim`.
    ///
    /// # Errors
    ///
    /// Fails if `ids.len()` does not match `shape`, or with
    /// [`LayerError::IndexOutOfRange`] for an id outside the table.
    pub fn lookup(&self, ids: &[usize], shape: &[usize]) -> LayerResult<Tensor> {
        let expected: usize = shape.iter().product();
        if ids.len() != expected {
            return Err(LayerError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![ids.len()],
            });
        }
        let mut data = Vec::with_capacity(ids.len() * self.dim);
        for &id in ids {
            data.extend_from_slice(self.row(id)?);
        }
        let mut out_shape = shape.to_vec();
        out_shape.push(self.dim);
        Tensor::from_data(&out_shape, data)
    }

    /// Scatters `grad` (one `dim`-wide slice per id, in lookup order) into
    /// the per-row accumulator. Repeated ids sum.
    pub fn accumulate_grad(&mut self, ids: &[usize], grad: &Tensor) -> LayerResult<()> {
        if grad.numel() != ids.len() * self.dim {
            return Err(LayerError::ShapeMismatch {
                expected: vec![ids.len(), self.dim],
                actual: grad.shape().to_vec(),
            });
        }
        for &id in ids {
            self.check_index(id)?;
        }
        for (&id, g) in ids.iter().zip(grad.data().chunks(self.dim)) {
            let slot = self
                .grads
                .entry(id)
                .or_insert_with(|| vec![0.0; g.len()]);
            for (s, v) in slot.iter_mut().zip(g) {
                *s += v;
            }
        }
        Ok(())
    }

    /// Accumulated gradient of one row, if the row was touched.
    pub fn row_grad(&self, index: usize) -> Option<&[f32]> {
        self.grads.get(&index).map(Vec::as_slice)
    }

    /// Drains the accumulated gradients in ascending row order.
    pub fn take_gradients(&mut self) -> Vec<(usize, Vec<f32>)> {
        std::mem::take(&mut self.grads).into_iter().collect()
    }

    /// Drops any accumulated gradients.
    pub fn clear_gradients(&mut self) {
        self.grads.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> EmbeddingTable {
        let weights = Tensor::from_data(&[4, 2], (0..8).map(|v| v as f32).collect()).unwrap();
        EmbeddingTable::from_weights("t", weights).unwrap()
    }

    #[test]
    fn test_lookup_gathers_rows_in_order() {
        let t = table();
        let out = t.lookup(&[2, 0, 3], &[1, 3]).unwrap();
        assert_eq!(out.shape(), &[1, 3, 2]);
        assert_eq!(out.data(), &[4.0, 5.0, 0.0, 1.0, 6.0, 7.0]);
    }

    #[test]
    fn test_lookup_rejects_out_of_range() {
        let t = table();
        let err = t.lookup(&[4], &[1]).unwrap_err();
        assert!(matches!(err, LayerError::IndexOutOfRange { index: 4, rows: 4, .. }));
        assert!(t.lookup(&[0, 1], &[3]).is_err());
    }

    #[test]
    fn test_accumulate_grad_sums_repeated_rows() {
        let mut t = table();
        let grad = Tensor::from_data(&[3, 2], vec![1.0, 1.0, 2.0, 2.0, 0.5, 0.5]).unwrap();
        t.accumulate_grad(&[1, 3, 1], &grad).unwrap();
        assert_eq!(t.row_grad(1).unwrap(), &[1.5, 1.5]);
        assert_eq!(t.row_grad(3).unwrap(), &[2.0, 2.0]);
        assert!(t.row_grad(0).is_none());

        let drained = t.take_gradients();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0, 1);
        assert!(t.row_grad(1).is_none());
    }

    #[test]
    fn test_row_mut_and_load_weights() {
        let mut t = table();
        t.row_mut(0).unwrap()[1] = 9.0;
        assert_eq!(t.row(0).unwrap(), &[0.0, 9.0]);
        assert!(t.load_weights(vec![0.0; 3]).is_err());
        t.load_weights(vec![1.0; 8]).unwrap();
        assert_eq!(t.weights().sum(), 8.0);
    }
}
