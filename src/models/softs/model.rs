use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::{backend::Backend, Tensor};
use tracing::debug;

use crate::data::WindowsBatch;
use crate::error::{check_dims, ForecastError};
use crate::models::{Forecaster, Mode};

use super::encoder::{
    InvertedEmbedding, InvertedEmbeddingConfig, SoftsEncoder, SoftsEncoderConfig,
    SoftsEncoderLayerConfig,
};

const INSTANCE_NORM_EPS: f64 = 1e-5;

/// Series-cOre Fused Time Series forecaster: channels are embedded as tokens
/// and mixed through STAR aggregate-dispatch layers.
#[derive(Module, Debug)]
pub struct Softs<B: Backend> {
    h: usize,
    input_size: usize,
    n_series: usize,
    use_norm: bool,
    outputsize_multiplier: usize,
    enc_embedding: InvertedEmbedding<B>,
    encoder: SoftsEncoder<B>,
    projection: Linear<B>,
}

impl<B: Backend> Softs<B> {
    /// Forecast `[B, h, N * outputsize_multiplier]`. Exogenous channels of the
    /// batch are ignored.
    pub fn forward(&self, batch: WindowsBatch<B>, mode: Mode) -> crate::error::Result<Tensor<B, 3>> {
        check_dims(
            "insample_y",
            [None, Some(self.input_size), Some(self.n_series)],
            batch.insample_y.dims(),
        )?;

        if batch.futr_exog.is_some() || batch.hist_exog.is_some() || batch.stat_exog.is_some() {
            debug!("exogenous inputs are not used by SOFTS");
        }

        let batch_size = batch.batch_size();
        let forecast = self.forecast_normalized(batch.insample_y, mode);

        Ok(forecast.reshape([
            batch_size,
            self.h,
            self.n_series * self.outputsize_multiplier,
        ]))
    }

    /// `[B, L, N]` -> `[B, h * outputsize_multiplier, N]`
    fn forecast_normalized(&self, x: Tensor<B, 3>, mode: Mode) -> Tensor<B, 3> {
        let (x, stats) = if self.use_norm {
            let (x, stats) = InstanceStats::normalize(x);
            (x, Some(stats))
        } else {
            (x, None)
        };

        let mut rng = mode.rng();

        let enc_out = self.enc_embedding.forward(x, rng.as_mut());
        let enc_out = self.encoder.forward(enc_out, rng.as_mut());
        let dec_out = self.projection.forward(enc_out).swap_dims(1, 2);

        match stats {
            Some(stats) => stats.denormalize(dec_out),
            None => dec_out,
        }
    }
}

/// Per-window, per-channel statistics over the time axis.
#[derive(Debug, Clone)]
struct InstanceStats<B: Backend> {
    /// `[B, 1, N]`
    means: Tensor<B, 3>,
    /// `[B, 1, N]`
    stdev: Tensor<B, 3>,
}

impl<B: Backend> InstanceStats<B> {
    fn normalize(x: Tensor<B, 3>) -> (Tensor<B, 3>, Self) {
        let [_, seq_len, _] = x.dims();

        let means = x.clone().mean_dim(1).detach();
        let centered = x - means.clone().repeat(1, seq_len);
        let var = (centered.clone() * centered.clone()).mean_dim(1);
        let stdev = (var + INSTANCE_NORM_EPS).sqrt();

        let x = centered / stdev.clone().repeat(1, seq_len);
        (x, Self { means, stdev })
    }

    fn denormalize(self, y: Tensor<B, 3>) -> Tensor<B, 3> {
        let [_, steps, _] = y.dims();
        y * self.stdev.repeat(1, steps) + self.means.repeat(1, steps)
    }
}

impl<B: Backend> Forecaster<B> for Softs<B> {
    fn horizon(&self) -> usize {
        self.h
    }

    fn forecast(&self, batch: WindowsBatch<B>, mode: Mode) -> crate::error::Result<Tensor<B, 3>> {
        self.forward(batch, mode)
    }
}

#[derive(Config, Debug)]
pub struct SoftsConfig {
    /// Forecast horizon.
    h: usize,
    /// Length of the insample window.
    input_size: usize,
    /// Number of jointly forecast series.
    n_series: usize,

    #[config(default = 512)]
    hidden_size: usize,

    #[config(default = 512)]
    d_core: usize,

    #[config(default = 2)]
    e_layers: usize,

    #[config(default = 2048)]
    d_ff: usize,

    #[config(default = 0.1)]
    dropout: f64,

    #[config(default = true)]
    use_norm: bool,

    #[config(default = 1)]
    outputsize_multiplier: usize,
}

impl SoftsConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        let sizes = [
            ("h", self.h),
            ("input_size", self.input_size),
            ("n_series", self.n_series),
            ("hidden_size", self.hidden_size),
            ("d_core", self.d_core),
            ("e_layers", self.e_layers),
            ("d_ff", self.d_ff),
            ("outputsize_multiplier", self.outputsize_multiplier),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
            return Err(ForecastError::InvalidConfig(format!("{name} must be positive")));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ForecastError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }

        Ok(())
    }

    pub fn init<B: Backend>(&self) -> crate::error::Result<Softs<B>> {
        self.validate()?;

        debug!(
            h = self.h,
            input_size = self.input_size,
            n_series = self.n_series,
            hidden_size = self.hidden_size,
            d_core = self.d_core,
            e_layers = self.e_layers,
            "initializing SOFTS"
        );

        let layer = SoftsEncoderLayerConfig::new(self.hidden_size, self.d_core, self.d_ff)
            .with_dropout(self.dropout);

        Ok(Softs {
            h: self.h,
            input_size: self.input_size,
            n_series: self.n_series,
            use_norm: self.use_norm,
            outputsize_multiplier: self.outputsize_multiplier,
            enc_embedding: InvertedEmbeddingConfig::new(self.input_size, self.hidden_size)
                .with_dropout(self.dropout)
                .init(),
            encoder: SoftsEncoderConfig::new(layer, self.e_layers).init(),
            projection: LinearConfig::new(self.hidden_size, self.h * self.outputsize_multiplier)
                .init(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Data, Distribution};

    type TestBackend = NdArray<f32>;

    fn small_config(n_series: usize) -> SoftsConfig {
        SoftsConfig::new(4, 10, n_series)
            .with_hidden_size(16)
            .with_d_core(8)
            .with_d_ff(32)
    }

    #[test]
    fn zero_window_gives_finite_forecast() {
        let model = small_config(1).init::<TestBackend>().unwrap();
        let batch = WindowsBatch::new(Tensor::zeros([2, 10, 1]));

        let forecast = model.forward(batch, Mode::Eval).unwrap();

        assert_eq!(forecast.dims(), [2, 4, 1]);
        assert!(forecast.into_data().value.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn multiplier_widens_output() {
        let model = small_config(3)
            .with_outputsize_multiplier(2)
            .init::<TestBackend>()
            .unwrap();
        let batch = WindowsBatch::new(Tensor::random([2, 10, 3], Distribution::Normal(0.0, 1.0)));

        let forecast = model.forward(batch, Mode::Train { seed: 0 }).unwrap();
        assert_eq!(forecast.dims(), [2, 4, 6]);
    }

    #[test]
    fn instance_norm_round_trips() {
        let x = Tensor::<TestBackend, 3>::random([2, 7, 3], Distribution::Normal(3.0, 2.0));

        let (normalized, stats) = InstanceStats::normalize(x.clone());
        let means = normalized.clone().mean_dim(1).into_data();
        means.assert_approx_eq(&Data::zeros([2, 1, 3]), 4);

        stats
            .denormalize(normalized)
            .into_data()
            .assert_approx_eq(&x.into_data(), 3);
    }

    #[test]
    fn eval_is_deterministic_and_train_follows_seed() {
        let model = small_config(4).init::<TestBackend>().unwrap();
        let y = Tensor::<TestBackend, 3>::random([3, 10, 4], Distribution::Normal(0.0, 1.0));

        let run = |mode| {
            model
                .forward(WindowsBatch::new(y.clone()), mode)
                .unwrap()
                .into_data()
        };

        assert_eq!(run(Mode::Eval), run(Mode::Eval));
        assert_eq!(run(Mode::Train { seed: 42 }), run(Mode::Train { seed: 42 }));
    }

    #[test]
    fn rejects_wrong_series_count() {
        let model = small_config(2).init::<TestBackend>().unwrap();
        let batch = WindowsBatch::new(Tensor::zeros([1, 10, 3]));

        let err = model.forward(batch, Mode::Eval).unwrap_err();
        assert!(matches!(err, ForecastError::ShapeMismatch { input: "insample_y", .. }));
    }

    #[test]
    fn rejects_zero_layers() {
        let err = small_config(1).with_e_layers(0).init::<TestBackend>().unwrap_err();
        assert!(matches!(err, ForecastError::InvalidConfig(_)));
    }
}
