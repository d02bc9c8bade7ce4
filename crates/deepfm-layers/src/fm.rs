//! Factorization-machine interaction terms.
//!
//! # Mathematical Formulation
//!
//! For field embeddings `v_f` (already scaled by their field values), the
//! second-order term is the sum of all pairwise element-wise products:
//! ```text
//! y_k = sum_{i<j} v_ik * v_jk = 0.5 * ((sum_f v_fk)^2 - sum_f v_fk^2)
//! ```
//! which is evaluated in `O(fields * k)` instead of `O(fields^2 * k)`.
//! Both sums are accumulated in `f64`; the squared difference would
//! otherwise overflow to `inf - inf` for field values around `1e20`.
//!
//! [`scale_by_field_values`] implements the value scaling shared by the
//! first-order and second-order terms.

use crate::error::{LayerError, LayerResult};
use crate::layer::Layer;
use crate::tensor::{saturate, Tensor};
use ndarray::Axis;

/// Multiplies each `[batch, fields, dim]` embedding by its `[batch, fields]`
/// field value.
///
/// The operation is linear in `emb`, so it also maps an output gradient to
/// the embedding gradient.
///
/// ```
/// use deepfm_layers::fm::scale_by_field_values;
/// use deepfm_layers::tensor::Tensor;
///
/// let emb = Tensor::ones(&[1, 2, 3]);
/// let values = Tensor::from_data(&[1, 2], vec![2.0, 0.5]).unwrap();
/// let out = scale_by_field_values(&emb, &values).unwrap();
/// assert_eq!(out.data(), &[2.0, 2.0, 2.0, 0.5, 0.5, 0.5]);
/// ```
pub fn scale_by_field_values(emb: &Tensor, values: &Tensor) -> LayerResult<Tensor> {
    emb.expect_rank(3)?;
    values.expect_rank(2)?;
    let (batch, fields, dim) = (emb.shape()[0], emb.shape()[1], emb.shape()[2]);
    if values.shape() != [batch, fields] {
        return Err(LayerError::ShapeMismatch {
            expected: vec![batch, fields],
            actual: values.shape().to_vec(),
        });
    }
    let mut out = emb.clone();
    if dim > 0 {
        for (chunk, value) in out.data_mut().chunks_mut(dim).zip(values.data()) {
            for v in chunk.iter_mut() {
                *v = saturate(f64::from(*v) * f64::from(*value));
            }
        }
    }
    Ok(out)
}

/// FM second-order interaction over `[batch, fields, k]` embeddings,
/// producing `[batch, k]`.
#[derive(Debug, Clone, Default)]
pub struct FmSecondOrder {
    cached_input: Option<Tensor>,
}

impl FmSecondOrder {
    /// Creates the interaction layer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for FmSecondOrder {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        input.expect_rank(3)?;
        let v = input.view()?.mapv(f64::from);
        let sum = v.sum_axis(Axis(1));
        let sum_of_squares = v.mapv(|x| x * x).sum_axis(Axis(1));
        let out = (&sum * &sum - &sum_of_squares) * 0.5;
        Ok(Tensor::from_array(out.mapv(saturate)))
    }

    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let output = self.forward(input)?;
        self.cached_input = Some(input.clone());
        Ok(output)
    }

    /// `d y_k / d v_fk = sum_g v_gk - v_fk`
    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let input = self
            .cached_input
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        let (batch, fields, k) = (input.shape()[0], input.shape()[1], input.shape()[2]);
        if grad.shape() != [batch, k] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![batch, k],
                actual: grad.shape().to_vec(),
            });
        }
        let sum = input.sum_axis(1)?;
        let (v, s, g) = (input.data(), sum.data(), grad.data());
        let mut dv = vec![0.0; input.numel()];
        for b in 0..batch {
            for f in 0..fields {
                for j in 0..k {
                    let idx = (b * fields + f) * k + j;
                    dv[idx] = g[b * k + j] * (s[b * k + j] - v[idx]);
                }
            }
        }
        Tensor::from_data(input.shape(), dv)
    }

    fn name(&self) -> &str {
        "FmSecondOrder"
    }
}
