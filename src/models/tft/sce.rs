use burn::config::Config;
use burn::module::Module;
use burn::tensor::{backend::Backend, Tensor};
use rand::rngs::StdRng;

use super::grn::{GatedResidualNetwork, GatedResidualNetworkConfig};
use super::vsn::{VariableSelectionNetwork, VariableSelectionNetworkConfig};

/// Context vectors derived from the static covariates, each `[B, H]`.
#[derive(Debug, Clone)]
pub struct StaticContexts<B: Backend> {
    /// Variable selection context.
    pub cs: Tensor<B, 2>,
    /// Enrichment context.
    pub ce: Tensor<B, 2>,
    /// Initial hidden state of the history encoder.
    pub ch: Tensor<B, 2>,
    /// Initial cell state of the history encoder.
    pub cc: Tensor<B, 2>,
}

impl<B: Backend> StaticContexts<B> {
    pub fn zeros(batch_size: usize, d_hidden: usize, device: &B::Device) -> Self {
        let zeros = || Tensor::zeros([batch_size, d_hidden]).to_device(device);

        Self {
            cs: zeros(),
            ce: zeros(),
            ch: zeros(),
            cc: zeros(),
        }
    }
}

#[derive(Module, Debug)]
pub struct StaticCovariateEncoder<B: Backend> {
    vsn: VariableSelectionNetwork<B>,
    selection_grn: GatedResidualNetwork<B>,
    enrichment_grn: GatedResidualNetwork<B>,
    state_h_grn: GatedResidualNetwork<B>,
    state_c_grn: GatedResidualNetwork<B>,
}

impl<B: Backend> StaticCovariateEncoder<B> {
    /// `variables`: one `[B, H]` embedding per static covariate.
    /// Also returns the static selection weights `[B, S]`.
    pub fn forward(
        &self,
        variables: Vec<Tensor<B, 2>>,
        mut rng: Option<&mut StdRng>,
    ) -> (StaticContexts<B>, Tensor<B, 2>) {
        let (variable_ctx, sparse_weights) =
            self.vsn.forward(variables, None, rng.as_deref_mut());

        let contexts = StaticContexts {
            cs: self
                .selection_grn
                .forward(variable_ctx.clone(), None, rng.as_deref_mut()),
            ce: self
                .enrichment_grn
                .forward(variable_ctx.clone(), None, rng.as_deref_mut()),
            ch: self
                .state_h_grn
                .forward(variable_ctx.clone(), None, rng.as_deref_mut()),
            cc: self.state_c_grn.forward(variable_ctx, None, rng),
        };

        (contexts, sparse_weights)
    }
}

#[derive(Config, Debug)]
pub struct StaticCovariateEncoderConfig {
    d_hidden: usize,
    num_static_vars: usize,

    #[config(default = 0.0)]
    dropout: f64,
}

impl StaticCovariateEncoderConfig {
    pub fn init<B: Backend>(&self) -> StaticCovariateEncoder<B> {
        let context_grn = || {
            GatedResidualNetworkConfig::new(self.d_hidden, self.d_hidden)
                .with_dropout(self.dropout)
                .init()
        };

        StaticCovariateEncoder {
            vsn: VariableSelectionNetworkConfig::new(self.d_hidden, self.num_static_vars)
                .with_dropout(self.dropout)
                .init(),
            selection_grn: context_grn(),
            enrichment_grn: context_grn(),
            state_h_grn: context_grn(),
            state_c_grn: context_grn(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn produces_four_distinct_contexts() {
        let encoder = StaticCovariateEncoderConfig::new(8, 3).init::<TestBackend>();
        let variables = (0..3)
            .map(|_| Tensor::random([2, 8], Distribution::Normal(0.0, 1.0)))
            .collect();

        let (contexts, weights) = encoder.forward(variables, None);

        for ctx in [&contexts.cs, &contexts.ce, &contexts.ch, &contexts.cc] {
            assert_eq!(ctx.dims(), [2, 8]);
        }
        assert_eq!(weights.dims(), [2, 3]);

        // No shared weights between the context networks.
        let diff = (contexts.cs - contexts.ce).abs().sum().into_scalar();
        assert!(diff > 0.0);
    }

    #[test]
    fn zero_contexts() {
        let contexts = StaticContexts::<TestBackend>::zeros(3, 4, &Default::default());

        assert_eq!(contexts.ch.dims(), [3, 4]);
        assert_eq!(contexts.cc.abs().sum().into_scalar(), 0.0);
    }
}
