use burn::config::Config;
use burn::module::Module;
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::{backend::Backend, Tensor};
use rand::rngs::StdRng;

use crate::modules::dropout::{Dropout, DropoutConfig};

use super::stad::{Stad, StadConfig};

const SOFTS_LAYER_NORM_EPS: f64 = 1e-5;

/// Series embedding over the time axis: every channel's window becomes one
/// token of width `d_model`.
#[derive(Module, Debug)]
pub struct InvertedEmbedding<B: Backend> {
    value_embedding: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> InvertedEmbedding<B> {
    /// `[B, L, N]` -> `[B, N, d_model]`
    pub fn forward(&self, x: Tensor<B, 3>, rng: Option<&mut StdRng>) -> Tensor<B, 3> {
        let x = x.swap_dims(1, 2);
        self.dropout.forward(self.value_embedding.forward(x), rng)
    }
}

#[derive(Config, Debug)]
pub struct InvertedEmbeddingConfig {
    input_size: usize,
    d_model: usize,

    #[config(default = 0.0)]
    dropout: f64,
}

impl InvertedEmbeddingConfig {
    pub fn init<B: Backend>(&self) -> InvertedEmbedding<B> {
        InvertedEmbedding {
            value_embedding: LinearConfig::new(self.input_size, self.d_model).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// STAD mixing followed by a position-wise feed forward, each in a
/// post-norm residual.
#[derive(Module, Debug)]
pub struct SoftsEncoderLayer<B: Backend> {
    stad: Stad<B>,
    conv1: Linear<B>,
    conv2: Linear<B>,
    norm1: LayerNorm<B>,
    norm2: LayerNorm<B>,
    dropout: Dropout,
}

impl<B: Backend> SoftsEncoderLayer<B> {
    /// With an rng, STAD samples its core and dropout is active.
    pub fn forward(&self, x: Tensor<B, 3>, mut rng: Option<&mut StdRng>) -> Tensor<B, 3> {
        let mixed = self.stad.forward(x.clone(), rng.as_deref_mut());
        let x = self
            .norm1
            .forward(x + self.dropout.forward(mixed, rng.as_deref_mut()));

        let y = activation::gelu(self.conv1.forward(x.clone()));
        let y = self.dropout.forward(y, rng.as_deref_mut());
        let y = self.dropout.forward(self.conv2.forward(y), rng);

        self.norm2.forward(x + y)
    }
}

#[derive(Config, Debug)]
pub struct SoftsEncoderLayerConfig {
    d_model: usize,
    d_core: usize,
    d_ff: usize,

    #[config(default = 0.0)]
    dropout: f64,
}

impl SoftsEncoderLayerConfig {
    pub fn init<B: Backend>(&self) -> SoftsEncoderLayer<B> {
        let layer_norm = || {
            LayerNormConfig::new(self.d_model)
                .with_epsilon(SOFTS_LAYER_NORM_EPS)
                .init()
        };

        SoftsEncoderLayer {
            stad: StadConfig::new(self.d_model, self.d_core).init(),
            conv1: LinearConfig::new(self.d_model, self.d_ff).init(),
            conv2: LinearConfig::new(self.d_ff, self.d_model).init(),
            norm1: layer_norm(),
            norm2: layer_norm(),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct SoftsEncoder<B: Backend> {
    layers: Vec<SoftsEncoderLayer<B>>,
}

impl<B: Backend> SoftsEncoder<B> {
    /// The same rng is threaded through every layer, so one seed fixes the
    /// draws of the whole stack.
    pub fn forward(&self, x: Tensor<B, 3>, mut rng: Option<&mut StdRng>) -> Tensor<B, 3> {
        self.layers
            .iter()
            .fold(x, |x, layer| layer.forward(x, rng.as_deref_mut()))
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

#[derive(Config, Debug)]
pub struct SoftsEncoderConfig {
    layer: SoftsEncoderLayerConfig,
    e_layers: usize,
}

impl SoftsEncoderConfig {
    pub fn init<B: Backend>(&self) -> SoftsEncoder<B> {
        SoftsEncoder {
            layers: (0..self.e_layers).map(|_| self.layer.init()).collect(),
        }
    }
}
