use burn::config::Config;
use burn::module::Module;
use burn::nn::{LayerNorm, LayerNormConfig, Lstm, LstmConfig};
use burn::tensor::{backend::Backend, Tensor};
use rand::rngs::StdRng;

use super::glu::{GatedLinearUnit, GatedLinearUnitConfig};
use super::grn::TFT_LAYER_NORM_EPS;
use super::sce::StaticContexts;
use super::vsn::{VariableSelectionNetwork, VariableSelectionNetworkConfig};

#[derive(Debug, Clone)]
pub struct TemporalEncoding<B: Backend> {
    /// `[B, L + h, H]`
    pub temporal_features: Tensor<B, 3>,
    /// `[B, L, num_historic_vars]`
    pub history_weights: Tensor<B, 3>,
    /// `[B, h, num_future_vars]`
    pub future_weights: Tensor<B, 3>,
}

/// Variable selection over the historical and future windows, followed by two
/// LSTMs that read the windows as one continuous sequence.
#[derive(Module, Debug)]
pub struct TemporalCovariateEncoder<B: Backend> {
    history_vsn: VariableSelectionNetwork<B>,
    history_encoder: Lstm<B>,
    future_vsn: VariableSelectionNetwork<B>,
    future_encoder: Lstm<B>,
    input_gate: GatedLinearUnit<B>,
    input_gate_ln: LayerNorm<B>,
}

impl<B: Backend> TemporalCovariateEncoder<B> {
    /// `historical_inputs`: `[B, L, H]` per historic variable,
    /// `future_inputs`: `[B, h, H]` per future variable.
    pub fn forward(
        &self,
        historical_inputs: Vec<Tensor<B, 3>>,
        future_inputs: Vec<Tensor<B, 3>>,
        contexts: &StaticContexts<B>,
        mut rng: Option<&mut StdRng>,
    ) -> TemporalEncoding<B> {
        let (historical_features, history_weights) = self.history_vsn.forward(
            historical_inputs,
            Some(contexts.cs.clone()),
            rng.as_deref_mut(),
        );

        // Lstm states are (cell, hidden).
        let initial_state = (contexts.cc.clone(), contexts.ch.clone());
        let (history_cells, history) = self
            .history_encoder
            .forward(historical_features.clone(), Some(initial_state));

        let (future_features, future_weights) =
            self.future_vsn
                .forward(future_inputs, Some(contexts.cs.clone()), rng);

        let terminal_state = (last_step(history_cells), last_step(history.clone()));
        let (_, future) = self
            .future_encoder
            .forward(future_features.clone(), Some(terminal_state));

        let input_embedding = Tensor::cat(vec![historical_features, future_features], 1);
        let temporal_features = Tensor::cat(vec![history, future], 1);
        let temporal_features = self.input_gate.forward(temporal_features);
        let temporal_features = self.input_gate_ln.forward(temporal_features + input_embedding);

        TemporalEncoding {
            temporal_features,
            history_weights,
            future_weights,
        }
    }
}

/// `[B, T, H]` -> `[B, H]` at `T - 1`.
fn last_step<B: Backend>(states: Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch_size, seq_len, d_hidden] = states.dims();
    states
        .slice([0..batch_size, seq_len - 1..seq_len, 0..d_hidden])
        .squeeze(1)
}

#[derive(Config, Debug)]
pub struct TemporalCovariateEncoderConfig {
    d_hidden: usize,
    num_historic_vars: usize,
    num_future_vars: usize,

    #[config(default = 0.0)]
    dropout: f64,
}

impl TemporalCovariateEncoderConfig {
    pub fn init<B: Backend>(&self) -> TemporalCovariateEncoder<B> {
        let vsn = |num_inputs: usize| {
            VariableSelectionNetworkConfig::new(self.d_hidden, num_inputs)
                .with_context(true)
                .with_dropout(self.dropout)
                .init()
        };

        TemporalCovariateEncoder {
            history_vsn: vsn(self.num_historic_vars),
            history_encoder: LstmConfig::new(self.d_hidden, self.d_hidden, true).init(),
            future_vsn: vsn(self.num_future_vars),
            future_encoder: LstmConfig::new(self.d_hidden, self.d_hidden, true).init(),
            input_gate: GatedLinearUnitConfig::new(self.d_hidden, self.d_hidden).init(),
            input_gate_ln: LayerNormConfig::new(self.d_hidden)
                .with_epsilon(TFT_LAYER_NORM_EPS)
                .init(),
        }
    }
}
