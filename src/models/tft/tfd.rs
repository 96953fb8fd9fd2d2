use burn::config::Config;
use burn::module::Module;
use burn::nn::{LayerNorm, LayerNormConfig};
use burn::tensor::{backend::Backend, Tensor};
use rand::rngs::StdRng;

use super::attention::{InterpretableMultiHeadAttention, InterpretableMultiHeadAttentionConfig};
use super::glu::{GatedLinearUnit, GatedLinearUnitConfig};
use super::grn::{GatedResidualNetwork, GatedResidualNetworkConfig, TFT_LAYER_NORM_EPS};

#[derive(Debug, Clone)]
pub struct DecoderOutput<B: Backend> {
    /// `[B, h, H]`
    pub decoded: Tensor<B, 3>,
    /// `[B, M, L + h, L + h]`
    pub attn_prob: Tensor<B, 4>,
}

#[derive(Module, Debug)]
pub struct TemporalFusionDecoder<B: Backend> {
    horizon: usize,
    enrichment_grn: GatedResidualNetwork<B>,
    attention: InterpretableMultiHeadAttention<B>,
    attention_gate: GatedLinearUnit<B>,
    attention_ln: LayerNorm<B>,
    positionwise_grn: GatedResidualNetwork<B>,
    decoder_gate: GatedLinearUnit<B>,
    decoder_ln: LayerNorm<B>,
}

impl<B: Backend> TemporalFusionDecoder<B> {
    /// `temporal_features`: `[B, L + h, H]`, `ce`: `[B, H]`.
    pub fn forward(
        &self,
        temporal_features: Tensor<B, 3>,
        ce: Tensor<B, 2>,
        mut rng: Option<&mut StdRng>,
    ) -> DecoderOutput<B> {
        let enriched = self.enrichment_grn.forward(
            temporal_features.clone(),
            Some(ce),
            rng.as_deref_mut(),
        );

        let attention = self
            .attention
            .forward(enriched.clone(), true, rng.as_deref_mut());

        // Only the forecast window is decoded.
        let [batch_size, seq_len, d_hidden] = temporal_features.dims();
        let future = [0..batch_size, seq_len - self.horizon..seq_len, 0..d_hidden];
        let x = attention.output.slice(future.clone());
        let temporal_features = temporal_features.slice(future.clone());
        let enriched = enriched.slice(future);

        let x = self.attention_gate.forward(x);
        let x = self.attention_ln.forward(x + enriched);

        let x = self.positionwise_grn.forward(x, None, rng);

        let x = self.decoder_gate.forward(x);
        let decoded = self.decoder_ln.forward(x + temporal_features);

        DecoderOutput {
            decoded,
            attn_prob: attention.attn_prob,
        }
    }
}

#[derive(Config, Debug)]
pub struct TemporalFusionDecoderConfig {
    n_head: usize,
    d_hidden: usize,
    example_length: usize,
    horizon: usize,

    #[config(default = 0.0)]
    attn_dropout: f64,

    #[config(default = 0.0)]
    dropout: f64,
}

impl TemporalFusionDecoderConfig {
    pub fn init<B: Backend>(&self) -> TemporalFusionDecoder<B> {
        assert!(
            self.horizon > 0 && self.horizon <= self.example_length,
            "horizon must be positive and fit in the example length"
        );

        let layer_norm = || {
            LayerNormConfig::new(self.d_hidden)
                .with_epsilon(TFT_LAYER_NORM_EPS)
                .init()
        };

        TemporalFusionDecoder {
            horizon: self.horizon,
            enrichment_grn: GatedResidualNetworkConfig::new(self.d_hidden, self.d_hidden)
                .with_d_context(Some(self.d_hidden))
                .with_dropout(self.dropout)
                .init(),
            attention: InterpretableMultiHeadAttentionConfig::new(
                self.n_head,
                self.d_hidden,
                self.example_length,
            )
            .with_attn_dropout(self.attn_dropout)
            .with_dropout(self.dropout)
            .init(),
            attention_gate: GatedLinearUnitConfig::new(self.d_hidden, self.d_hidden).init(),
            attention_ln: layer_norm(),
            positionwise_grn: GatedResidualNetworkConfig::new(self.d_hidden, self.d_hidden)
                .with_dropout(self.dropout)
                .init(),
            decoder_gate: GatedLinearUnitConfig::new(self.d_hidden, self.d_hidden).init(),
            decoder_ln: layer_norm(),
        }
    }
}
