use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::{backend::Backend, Data, Int, Shape, Tensor};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use tracing::trace;

use crate::utils::nan_to_num;

/// STar Aggregate-Dispatch: channels are summarised into one low-dimensional
/// core, which is dispatched back to every channel and fused with it.
#[derive(Module, Debug)]
pub struct Stad<B: Backend> {
    gen1: Linear<B>,
    gen2: Linear<B>,
    gen3: Linear<B>,
    gen4: Linear<B>,
}

impl<B: Backend> Stad<B> {
    /// `x`: `[B, C, d_series]`. Passing an rng selects the stochastic
    /// (training) pooling, `None` the weighted mean.
    pub fn forward(&self, x: Tensor<B, 3>, rng: Option<&mut StdRng>) -> Tensor<B, 3> {
        let core = self.core(x.clone());

        let pooled = match rng {
            Some(rng) => stochastic_pool(core, rng),
            None => weighted_mean_pool(core),
        };

        let fused = Tensor::cat(vec![x, pooled], 2);
        let fused = activation::gelu(self.gen3.forward(fused));
        self.gen4.forward(fused)
    }

    /// Per-channel core representation, `[B, C, d_core]`.
    pub fn core(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = activation::gelu(self.gen1.forward(x));
        self.gen2.forward(x)
    }
}

/// `sum_c core[c] * softmax_c(core)[c]`, broadcast back to every channel.
pub fn weighted_mean_pool<B: Backend>(core: Tensor<B, 3>) -> Tensor<B, 3> {
    let [_, channels, _] = core.dims();
    let weight = activation::softmax(core.clone(), 1);

    (core * weight).sum_dim(1).repeat(1, channels)
}

/// For every (batch, core dimension) pair, draws one channel with probability
/// `softmax_c(core)` and broadcasts its value to every channel.
pub fn stochastic_pool<B: Backend>(core: Tensor<B, 3>, rng: &mut StdRng) -> Tensor<B, 3> {
    let [batch_size, channels, d_core] = core.dims();

    let ratio = activation::softmax(nan_to_num(core.clone()), 1);
    let ratio = ratio.into_data().convert::<f32>().value;

    let mut indices: Vec<i64> = Vec::with_capacity(batch_size * d_core);
    let mut weights: Vec<f32> = Vec::with_capacity(channels);
    for b in 0..batch_size {
        for d in 0..d_core {
            weights.clear();
            weights.extend((0..channels).map(|c| ratio[(b * channels + c) * d_core + d]));
            indices.push(draw_channel(&weights, rng) as i64);
        }
    }

    let indices = Data::new(indices, Shape::new([batch_size, 1, d_core]));
    let indices: Tensor<B, 3, Int> = Tensor::from_data(indices.convert()).to_device(&core.device());

    core.gather(1, indices).repeat(1, channels)
}

/// Samples a channel index from `weights`. Weights the sampler cannot use
/// (all zero, or not finite) fall back to the heaviest finite channel.
fn draw_channel(weights: &[f32], rng: &mut StdRng) -> usize {
    // An infinite total weight panics inside the uniform sampler.
    if weights.iter().all(|w| w.is_finite()) {
        match WeightedIndex::new(weights) {
            Ok(dist) => return dist.sample(rng),
            Err(err) => trace!(%err, "degenerate channel weights, taking the largest"),
        }
    } else {
        trace!("non-finite channel weights, taking the largest");
    }

    weights
        .iter()
        .enumerate()
        .filter(|(_, w)| w.is_finite())
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map_or(0, |(idx, _)| idx)
}

#[derive(Config, Debug)]
pub struct StadConfig {
    d_series: usize,
    d_core: usize,
}

impl StadConfig {
    pub fn init<B: Backend>(&self) -> Stad<B> {
        Stad {
            gen1: LinearConfig::new(self.d_series, self.d_series).init(),
            gen2: LinearConfig::new(self.d_series, self.d_core).init(),
            gen3: LinearConfig::new(self.d_series + self.d_core, self.d_series).init(),
            gen4: LinearConfig::new(self.d_series, self.d_series).init(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution as TensorDistribution;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    #[test]
    fn weighted_mean_matches_formula() {
        // One batch, two channels, two core dimensions.
        let core = Tensor::<TestBackend, 3>::from_floats([[[0.0, 1.0], [2.0, -1.0]]]);

        let pooled = weighted_mean_pool(core);
        assert_eq!(pooled.dims(), [1, 2, 2]);

        let w = |a: f32, b: f32| (a.exp() / (a.exp() + b.exp()), b.exp() / (a.exp() + b.exp()));
        let (w00, w10) = w(0.0, 2.0);
        let (w01, w11) = w(1.0, -1.0);
        let d0 = 0.0 * w00 + 2.0 * w10;
        let d1 = 1.0 * w01 + -1.0 * w11;

        pooled
            .into_data()
            .assert_approx_eq(&Data::from([[[d0, d1], [d0, d1]]]), 5);
    }

    #[test]
    fn stochastic_pool_picks_channel_values() {
        let core = Tensor::<TestBackend, 3>::random([3, 5, 4], TensorDistribution::Normal(0.0, 1.0));
        let mut rng = StdRng::seed_from_u64(7);

        let pooled = stochastic_pool(core.clone(), &mut rng);
        assert_eq!(pooled.dims(), [3, 5, 4]);

        let core = core.into_data().value;
        let pooled = pooled.into_data().value;
        for b in 0..3 {
            for d in 0..4 {
                let picked = pooled[(b * 5) * 4 + d];
                // Same value dispatched to every channel.
                for c in 0..5 {
                    assert_eq!(pooled[(b * 5 + c) * 4 + d], picked);
                }
                assert!((0..5).any(|c| core[(b * 5 + c) * 4 + d] == picked));
            }
        }
    }

    #[test]
    fn stochastic_pool_is_reproducible_with_seed() {
        let core = Tensor::<TestBackend, 3>::random([2, 6, 3], TensorDistribution::Normal(0.0, 1.0));

        let a = stochastic_pool(core.clone(), &mut StdRng::seed_from_u64(11));
        let b = stochastic_pool(core, &mut StdRng::seed_from_u64(11));
        assert_eq!(a.into_data(), b.into_data());
    }

    #[test]
    fn stochastic_pool_survives_nan() {
        let core = Tensor::<TestBackend, 3>::from_floats([[[f32::NAN, 4.0], [0.0, -2.0], [1.0, 3.0]]]);

        let pooled = stochastic_pool(core, &mut StdRng::seed_from_u64(3));
        assert_eq!(pooled.dims(), [1, 3, 2]);

        // NaN only leaves the sampling probabilities; any channel value may
        // still be drawn, but nothing outside the column.
        let columns = [[f32::NAN, 0.0, 1.0], [4.0, -2.0, 3.0]];
        let pooled = pooled.into_data().value;
        for (d, column) in columns.iter().enumerate() {
            let picked = pooled[d];
            for c in 0..3 {
                let value = pooled[c * 2 + d];
                assert!(value == picked || (value.is_nan() && picked.is_nan()));
            }
            assert!(column
                .iter()
                .any(|v| *v == picked || (v.is_nan() && picked.is_nan())));
        }
    }

    #[test]
    fn draw_channel_never_picks_zero_weight() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            assert_ne!(draw_channel(&[0.3, 0.0, 0.7], &mut rng), 1);
        }
    }

    #[test]
    fn draw_channel_falls_back_on_degenerate_weights() {
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(draw_channel(&[0.0, 0.0, 0.0], &mut rng), 0);
        assert_eq!(draw_channel(&[0.2, f32::NAN, 0.5], &mut rng), 2);
        assert_eq!(draw_channel(&[f32::INFINITY, 0.1, 0.4], &mut rng), 2);
    }

    #[test]
    fn train_and_eval_pooling_diverge() {
        let stad = StadConfig::new(8, 4).init::<TestBackend>();
        let x = Tensor::<TestBackend, 3>::random([2, 6, 8], TensorDistribution::Normal(0.0, 1.0));

        let eval_a = stad.forward(x.clone(), None).into_data();
        let eval_b = stad.forward(x.clone(), None).into_data();
        assert_eq!(eval_a, eval_b);

        let mut rng = StdRng::seed_from_u64(5);
        let train = stad.forward(x, Some(&mut rng)).into_data();
        assert_ne!(train, eval_a);
    }
}
