//! Point and probabilistic losses.
//!
//! The models do not compute losses themselves; a loss is handed to the
//! surrounding training code, and its [`ForecastLoss::outputsize_multiplier`]
//! sizes the models' output adapters.

use burn::tensor::{backend::Backend, Data, Shape, Tensor};

pub trait ForecastLoss<B: Backend> {
    /// Number of outputs the loss consumes per forecasted value.
    fn outputsize_multiplier(&self) -> usize;

    /// `y`: `[B, h, N]`, `y_hat`: `[B, h, N * outputsize_multiplier]` laid out
    /// as `[multiplier, N]` on the last axis, `mask`: `[B, h, N]` with 1 for
    /// observed values.
    fn loss(&self, y: Tensor<B, 3>, y_hat: Tensor<B, 3>, mask: Option<Tensor<B, 3>>)
        -> Tensor<B, 1>;
}

/// Mean of `x` over the entries where `weights` is nonzero, weighted by it.
pub fn weighted_average<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    weights: Tensor<B, D>,
) -> Tensor<B, 1> {
    let zeros = x.zeros_like();
    let mask = weights.clone().equal_elem(0.0).bool_not();
    let weighted = x * weights.clone();

    let weighted_tensor = zeros.mask_where(mask, weighted);
    let sum_weights = weights.sum().clamp_min(1.0);

    weighted_tensor.sum() / sum_weights
}

/// Pinball loss. `y_true`: `[B, h, N]`, `y_pred`: `[B, h, Q, N]`,
/// returns `[B, h, Q, N]`.
pub fn quantile_loss<B: Backend>(
    y_true: Tensor<B, 3>,
    y_pred: Tensor<B, 4>,
    quantiles: Tensor<B, 1>,
) -> Tensor<B, 4> {
    let [num_quantiles] = quantiles.dims();
    let quantiles: Tensor<B, 4> = quantiles.reshape([1, 1, num_quantiles, 1]);
    let y_true: Tensor<B, 4> = y_true.unsqueeze_dim::<4>(2).repeat(2, num_quantiles);
    let residual = y_true.clone() - y_pred.clone();
    let over = y_true.lower_equal(y_pred).float();
    (residual * (over - quantiles)).abs()
}

#[derive(Debug, Clone, Default)]
pub struct Mae;

impl<B: Backend> ForecastLoss<B> for Mae {
    fn outputsize_multiplier(&self) -> usize {
        1
    }

    fn loss(
        &self,
        y: Tensor<B, 3>,
        y_hat: Tensor<B, 3>,
        mask: Option<Tensor<B, 3>>,
    ) -> Tensor<B, 1> {
        let error = (y.clone() - y_hat).abs();
        let mask = mask.unwrap_or_else(|| y.ones_like());

        weighted_average(error, mask)
    }
}

#[derive(Debug, Clone)]
pub struct QuantileLoss {
    quantiles: Vec<f32>,
}

impl QuantileLoss {
    pub fn new(quantiles: Vec<f32>) -> Self {
        assert!(!quantiles.is_empty(), "at least one quantile is required");
        assert!(
            quantiles.iter().all(|q| *q > 0.0 && *q < 1.0),
            "quantiles must lie in (0, 1)"
        );
        Self { quantiles }
    }

    pub fn quantiles(&self) -> &[f32] {
        &self.quantiles
    }
}

impl Default for QuantileLoss {
    fn default() -> Self {
        Self::new(vec![0.1, 0.5, 0.9])
    }
}

impl<B: Backend> ForecastLoss<B> for QuantileLoss {
    fn outputsize_multiplier(&self) -> usize {
        self.quantiles.len()
    }

    fn loss(
        &self,
        y: Tensor<B, 3>,
        y_hat: Tensor<B, 3>,
        mask: Option<Tensor<B, 3>>,
    ) -> Tensor<B, 1> {
        let [batch_size, horizon, n_series] = y.dims();
        let num_quantiles = self.quantiles.len();

        let quantiles = Data::new(self.quantiles.clone(), Shape::new([num_quantiles]));
        let quantiles: Tensor<B, 1> =
            Tensor::from_data(quantiles.convert()).to_device(&y_hat.device());

        let y_hat = y_hat.reshape([batch_size, horizon, num_quantiles, n_series]);
        let mask = mask
            .unwrap_or_else(|| y.ones_like())
            .unsqueeze_dim::<4>(2)
            .repeat(2, num_quantiles);

        weighted_average(quantile_loss(y, y_hat, quantiles), mask)
    }
}
