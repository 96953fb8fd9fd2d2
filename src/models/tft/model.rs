use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::{backend::Backend, Tensor};
use tracing::{debug, trace};

use crate::data::WindowsBatch;
use crate::error::{check_dims, ForecastError};
use crate::models::{Forecaster, Mode};
use crate::utils::unstack;

use super::attention::InterpretableMultiHeadAttentionConfig;
use super::embedding::{TftEmbedding, TftEmbeddingConfig};
use super::sce::{StaticContexts, StaticCovariateEncoder, StaticCovariateEncoderConfig};
use super::tce::{TemporalCovariateEncoder, TemporalCovariateEncoderConfig};
use super::tfd::{TemporalFusionDecoder, TemporalFusionDecoderConfig};

/// Variable selection and attention weights of one forward pass.
#[derive(Debug, Clone)]
pub struct TftInterpretation<B: Backend> {
    /// `[B, S]`, absent without static covariates.
    pub static_weights: Option<Tensor<B, 2>>,
    /// `[B, L, O + K + Z]` in the order historical, future, target.
    pub history_weights: Tensor<B, 3>,
    /// `[B, h, K]`
    pub future_weights: Tensor<B, 3>,
    /// `[B, M, L + h, L + h]`
    pub attn_prob: Tensor<B, 4>,
}

#[derive(Module, Debug)]
pub struct TemporalFusionTransformer<B: Backend> {
    h: usize,
    input_size: usize,
    hidden_size: usize,
    tgt_size: usize,
    stat_exog_size: usize,
    hist_exog_size: usize,
    futr_exog_size: usize,
    embedding: TftEmbedding<B>,
    static_encoder: Option<StaticCovariateEncoder<B>>,
    temporal_encoder: TemporalCovariateEncoder<B>,
    temporal_fusion_decoder: TemporalFusionDecoder<B>,
    output_adapter: Linear<B>,
}

impl<B: Backend> TemporalFusionTransformer<B> {
    pub fn example_length(&self) -> usize {
        self.input_size + self.h
    }

    /// Forecast `[B, h, outputsize_multiplier]`. Dropout is active only in
    /// `Mode::Train`, with masks drawn from the mode's seed.
    pub fn forward(&self, batch: WindowsBatch<B>, mode: Mode) -> crate::error::Result<Tensor<B, 3>> {
        self.forward_interpretable(batch, mode)
            .map(|(forecast, _)| forecast)
    }

    pub fn forward_interpretable(
        &self,
        batch: WindowsBatch<B>,
        mode: Mode,
    ) -> crate::error::Result<(Tensor<B, 3>, TftInterpretation<B>)> {
        self.check_batch(&batch)?;
        let mut rng = mode.rng();

        let WindowsBatch {
            insample_y,
            futr_exog,
            hist_exog,
            stat_exog,
        } = batch;
        let [batch_size, _, _] = insample_y.dims();
        let device = insample_y.device();
        let l = self.input_size;

        let futr_exog = match futr_exog {
            Some(futr_exog) => futr_exog,
            None => {
                trace!("no future exogenous inputs, repeating the last insample value");
                synthesize_futr_exog(insample_y.clone(), self.example_length())
            }
        };

        let embedded = self
            .embedding
            .forward(insample_y, stat_exog, Some(futr_exog), hist_exog);

        let (contexts, static_weights) = match (&self.static_encoder, embedded.stat) {
            (Some(encoder), Some(stat)) => {
                let (contexts, weights) = encoder.forward(unstack(stat, 1), rng.as_mut());
                (contexts, Some(weights))
            }
            _ => {
                trace!("no static exogenous inputs, using zero contexts");
                (
                    StaticContexts::zeros(batch_size, self.hidden_size, &device),
                    None,
                )
            }
        };

        let futr = embedded
            .futr
            .ok_or(ForecastError::MissingInput("futr_exog"))?;
        let [_, futr_len, futr_vars, hidden] = futr.dims();

        let mut historical_inputs: Vec<Tensor<B, 3>> = Vec::new();
        if let Some(hist) = embedded.hist {
            let [_, _, hist_vars, _] = hist.dims();
            historical_inputs.extend(unstack::<B, 4, 3>(
                hist.slice([0..batch_size, 0..l, 0..hist_vars, 0..hidden]),
                2,
            ));
        }
        historical_inputs.extend(unstack::<B, 4, 3>(
            futr.clone().slice([0..batch_size, 0..l, 0..futr_vars, 0..hidden]),
            2,
        ));
        historical_inputs.extend(unstack::<B, 4, 3>(embedded.tgt, 2));

        let future_inputs = unstack(
            futr.slice([0..batch_size, l..futr_len, 0..futr_vars, 0..hidden]),
            2,
        );

        let encoding = self.temporal_encoder.forward(
            historical_inputs,
            future_inputs,
            &contexts,
            rng.as_mut(),
        );

        let decoding = self.temporal_fusion_decoder.forward(
            encoding.temporal_features,
            contexts.ce,
            rng.as_mut(),
        );

        let forecast = self.output_adapter.forward(decoding.decoded);

        let interpretation = TftInterpretation {
            static_weights,
            history_weights: encoding.history_weights,
            future_weights: encoding.future_weights,
            attn_prob: decoding.attn_prob,
        };

        Ok((forecast, interpretation))
    }

    fn check_batch(&self, batch: &WindowsBatch<B>) -> crate::error::Result<()> {
        let batch_size = batch.batch_size();
        check_dims(
            "insample_y",
            [None, Some(self.input_size), Some(self.tgt_size)],
            batch.insample_y.dims(),
        )?;

        match (&batch.futr_exog, self.futr_exog_size) {
            (Some(_), 0) => return Err(ForecastError::UnexpectedInput("futr_exog")),
            (None, size) if size > 0 => return Err(ForecastError::MissingInput("futr_exog")),
            (Some(futr), size) => check_dims(
                "futr_exog",
                [Some(batch_size), Some(self.example_length()), Some(size)],
                futr.dims(),
            )?,
            (None, _) => {}
        }

        match (&batch.hist_exog, self.hist_exog_size) {
            (Some(_), 0) => return Err(ForecastError::UnexpectedInput("hist_exog")),
            (None, size) if size > 0 => return Err(ForecastError::MissingInput("hist_exog")),
            (Some(hist), size) => {
                let dims = hist.dims();
                check_dims("hist_exog", [Some(batch_size), None, Some(size)], dims)?;
                if dims[1] < self.input_size {
                    return Err(ForecastError::ShapeMismatch {
                        input: "hist_exog",
                        expected: vec![batch_size, self.input_size, size],
                        found: dims.to_vec(),
                    });
                }
            }
            (None, _) => {}
        }

        match (&batch.stat_exog, self.stat_exog_size) {
            (Some(_), 0) => return Err(ForecastError::UnexpectedInput("stat_exog")),
            (None, size) if size > 0 => return Err(ForecastError::MissingInput("stat_exog")),
            (Some(stat), size) => {
                check_dims("stat_exog", [Some(batch_size), Some(size)], stat.dims())?
            }
            (None, _) => {}
        }

        Ok(())
    }
}

/// Stand-in for missing future covariates: the last observed target values
/// repeated over the whole example, `[B, example_length, Z]`.
pub fn synthesize_futr_exog<B: Backend>(
    insample_y: Tensor<B, 3>,
    example_length: usize,
) -> Tensor<B, 3> {
    let [batch_size, seq_len, tgt_size] = insample_y.dims();
    insample_y
        .slice([0..batch_size, seq_len - 1..seq_len, 0..tgt_size])
        .repeat(1, example_length)
}

impl<B: Backend> Forecaster<B> for TemporalFusionTransformer<B> {
    fn horizon(&self) -> usize {
        self.h
    }

    fn forecast(&self, batch: WindowsBatch<B>, mode: Mode) -> crate::error::Result<Tensor<B, 3>> {
        self.forward(batch, mode)
    }
}

#[derive(Config, Debug)]
pub struct TemporalFusionTransformerConfig {
    /// Forecast horizon.
    h: usize,
    /// Length of the insample window.
    input_size: usize,

    #[config(default = 1)]
    tgt_size: usize,

    #[config(default = 0)]
    stat_exog_size: usize,

    #[config(default = 0)]
    hist_exog_size: usize,

    #[config(default = 0)]
    futr_exog_size: usize,

    #[config(default = 128)]
    hidden_size: usize,

    #[config(default = 4)]
    n_head: usize,

    #[config(default = 0.0)]
    attn_dropout: f64,

    #[config(default = 0.1)]
    dropout: f64,

    /// Output width required by the loss, see `ForecastLoss::outputsize_multiplier`.
    #[config(default = 1)]
    outputsize_multiplier: usize,
}

impl TemporalFusionTransformerConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.h == 0 || self.input_size == 0 {
            return Err(ForecastError::InvalidConfig(
                "horizon and input size must be positive".to_string(),
            ));
        }
        if self.tgt_size == 0 || self.hidden_size == 0 || self.outputsize_multiplier == 0 {
            return Err(ForecastError::InvalidConfig(
                "target count, hidden size and output multiplier must be positive".to_string(),
            ));
        }

        for (name, rate) in [("dropout", self.dropout), ("attn_dropout", self.attn_dropout)] {
            if !(0.0..1.0).contains(&rate) {
                return Err(ForecastError::InvalidConfig(format!(
                    "{name} must be in [0, 1), got {rate}"
                )));
            }
        }

        InterpretableMultiHeadAttentionConfig::new(self.n_head, self.hidden_size, 1).validate()
    }

    /// Future-known variables seen by the model; without configured future
    /// covariates the last target values take their place.
    fn num_future_vars(&self) -> usize {
        if self.futr_exog_size > 0 {
            self.futr_exog_size
        } else {
            self.tgt_size
        }
    }

    pub fn init<B: Backend>(&self) -> crate::error::Result<TemporalFusionTransformer<B>> {
        self.validate()?;

        let example_length = self.input_size + self.h;
        let num_future_vars = self.num_future_vars();
        let num_historic_vars = num_future_vars + self.hist_exog_size + self.tgt_size;

        debug!(
            h = self.h,
            input_size = self.input_size,
            hidden_size = self.hidden_size,
            n_head = self.n_head,
            num_historic_vars,
            num_future_vars,
            stat_exog_size = self.stat_exog_size,
            "initializing temporal fusion transformer"
        );

        let embedding = TftEmbeddingConfig::new(self.hidden_size)
            .with_stat_input_size(self.stat_exog_size)
            .with_futr_input_size(num_future_vars)
            .with_hist_input_size(self.hist_exog_size)
            .with_tgt_size(self.tgt_size)
            .init();

        let static_encoder = if self.stat_exog_size > 0 {
            Some(
                StaticCovariateEncoderConfig::new(self.hidden_size, self.stat_exog_size)
                    .with_dropout(self.dropout)
                    .init(),
            )
        } else {
            None
        };

        let temporal_encoder = TemporalCovariateEncoderConfig::new(
            self.hidden_size,
            num_historic_vars,
            num_future_vars,
        )
        .with_dropout(self.dropout)
        .init();

        let temporal_fusion_decoder = TemporalFusionDecoderConfig::new(
            self.n_head,
            self.hidden_size,
            example_length,
            self.h,
        )
        .with_attn_dropout(self.attn_dropout)
        .with_dropout(self.dropout)
        .init();

        let output_adapter = LinearConfig::new(self.hidden_size, self.outputsize_multiplier).init();

        Ok(TemporalFusionTransformer {
            h: self.h,
            input_size: self.input_size,
            hidden_size: self.hidden_size,
            tgt_size: self.tgt_size,
            stat_exog_size: self.stat_exog_size,
            hist_exog_size: self.hist_exog_size,
            futr_exog_size: self.futr_exog_size,
            embedding,
            static_encoder,
            temporal_encoder,
            temporal_fusion_decoder,
            output_adapter,
        })
    }
}
