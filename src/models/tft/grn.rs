use burn::config::Config;
use burn::module::Module;
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::tensor::{backend::Backend, Tensor};
use rand::rngs::StdRng;

use crate::modules::dropout::{Dropout, DropoutConfig};
use crate::modules::elu::elu;

use super::glu::{GatedLinearUnit, GatedLinearUnitConfig};

pub(crate) const TFT_LAYER_NORM_EPS: f64 = 1e-3;

#[derive(Module, Debug)]
pub struct GatedResidualNetwork<B: Backend> {
    lin_a: Linear<B>,
    lin_c: Option<Linear<B>>,
    lin_i: Linear<B>,
    dropout: Dropout,
    glu: GatedLinearUnit<B>,
    skip_proj: Option<Linear<B>>,
    // Skipped for single-feature outputs.
    layer_norm: Option<LayerNorm<B>>,
}

impl<B: Backend> GatedResidualNetwork<B> {
    /// `a`: `[B, .., d_input]`, `c`: `[B, d_context]`; the context is
    /// broadcast over every axis between batch and features. Dropout is
    /// applied only when an rng is given.
    pub fn forward<const D: usize>(
        &self,
        a: Tensor<B, D>,
        c: Option<Tensor<B, 2>>,
        rng: Option<&mut StdRng>,
    ) -> Tensor<B, D> {
        let x = self.lin_a.forward(a.clone());

        let x = match (&self.lin_c, c) {
            (Some(lin_c), Some(c)) => {
                let c = lin_c.forward(c);
                let [batch_size, d_hidden] = c.dims();
                let mut shape = [1; D];
                shape[0] = batch_size;
                shape[D - 1] = d_hidden;
                let dims = x.dims();
                let c = (1..D - 1).fold(c.reshape(shape), |c, dim| c.repeat(dim, dims[dim]));
                x + c
            }
            (None, Some(_)) => panic!("context given to a GRN built without context"),
            (_, None) => x,
        };

        let x = elu(x, 1.0);
        let x = self.lin_i.forward(x);
        let x = self.dropout.forward(x, rng);
        let x = self.glu.forward(x);

        let skip = match &self.skip_proj {
            Some(proj) => proj.forward(a),
            None => a,
        };

        match &self.layer_norm {
            Some(norm) => norm.forward(x + skip),
            None => x + skip,
        }
    }
}

#[derive(Config, Debug)]
pub struct GatedResidualNetworkConfig {
    d_input: usize,
    d_hidden: usize,

    #[config(default = "None")]
    d_output: Option<usize>,

    #[config(default = "None")]
    d_context: Option<usize>,

    #[config(default = 0.0)]
    dropout: f64,
}

impl GatedResidualNetworkConfig {
    pub fn init<B: Backend>(&self) -> GatedResidualNetwork<B> {
        let d_input = self.d_input;
        let d_hidden = self.d_hidden;
        let d_output = self.d_output.unwrap_or(d_input);

        let lin_c = self
            .d_context
            .map(|d_context| LinearConfig::new(d_context, d_hidden).with_bias(false).init());

        let skip_proj = if d_input != d_output {
            Some(LinearConfig::new(d_input, d_output).init())
        } else {
            None
        };

        let layer_norm = if d_output == 1 {
            None
        } else {
            Some(
                LayerNormConfig::new(d_output)
                    .with_epsilon(TFT_LAYER_NORM_EPS)
                    .init(),
            )
        };

        GatedResidualNetwork {
            lin_a: LinearConfig::new(d_input, d_hidden).init(),
            lin_c,
            lin_i: LinearConfig::new(d_hidden, d_hidden).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            glu: GatedLinearUnitConfig::new(d_hidden, d_output).init(),
            skip_proj,
            layer_norm,
        }
    }
}
