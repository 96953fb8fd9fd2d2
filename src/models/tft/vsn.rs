use burn::config::Config;
use burn::module::Module;
use burn::tensor::activation;
use burn::tensor::{backend::Backend, Tensor};
use rand::rngs::StdRng;

use super::grn::{GatedResidualNetwork, GatedResidualNetworkConfig};

#[derive(Module, Debug)]
pub struct VariableSelectionNetwork<B: Backend> {
    joint_grn: GatedResidualNetwork<B>,
    var_grns: Vec<GatedResidualNetwork<B>>,
}

impl<B: Backend> VariableSelectionNetwork<B> {
    pub fn num_inputs(&self) -> usize {
        self.var_grns.len()
    }

    /// Fuses per-variable embeddings (`[B, H]` or `[B, T, H]` each) into one
    /// representation of the same shape. The second tensor holds the
    /// selection weights, `[B, N]` or `[B, T, N]`, summing to one over `N`.
    pub fn forward<const D: usize>(
        &self,
        variables: Vec<Tensor<B, D>>,
        context: Option<Tensor<B, 2>>,
        mut rng: Option<&mut StdRng>,
    ) -> (Tensor<B, D>, Tensor<B, D>) {
        assert_eq!(
            variables.len(),
            self.num_inputs(),
            "variable count does not match the selection network"
        );

        let flattened = Tensor::cat(variables.clone(), D - 1);
        let logits = self.joint_grn.forward(flattened, context, rng.as_deref_mut());
        let sparse_weights = activation::softmax(logits, D - 1);

        let transformed: Vec<Tensor<B, D>> = self
            .var_grns
            .iter()
            .zip(variables)
            .map(|(grn, var)| grn.forward(var, None, rng.as_deref_mut()))
            .collect();

        match D {
            2 => {
                let weight: Tensor<B, 3> = sparse_weights.clone().unsqueeze_dim(1);
                let transformed: Tensor<B, 3> = Tensor::stack(transformed, 2);
                let fused = (transformed * weight).sum_dim(2);

                (fused.squeeze(2), sparse_weights)
            }
            3 => {
                let weight: Tensor<B, 4> = sparse_weights.clone().unsqueeze_dim(2);
                let transformed: Tensor<B, 4> = Tensor::stack(transformed, 3);
                let fused = (transformed * weight).sum_dim(3);

                (fused.squeeze(3), sparse_weights)
            }
            _ => {
                panic!("Unsupported dimension")
            }
        }
    }
}

#[derive(Config, Debug)]
pub struct VariableSelectionNetworkConfig {
    d_hidden: usize,
    num_inputs: usize,

    #[config(default = false)]
    context: bool,

    #[config(default = 0.0)]
    dropout: f64,
}

impl VariableSelectionNetworkConfig {
    pub fn init<B: Backend>(&self) -> VariableSelectionNetwork<B> {
        assert!(self.num_inputs > 0, "variable selection needs at least one input");

        let d_context = if self.context {
            Some(self.d_hidden)
        } else {
            None
        };

        let joint_grn = GatedResidualNetworkConfig::new(self.d_hidden * self.num_inputs, self.d_hidden)
            .with_d_output(Some(self.num_inputs))
            .with_d_context(d_context)
            .init();

        let var_grns = (0..self.num_inputs)
            .map(|_| {
                GatedResidualNetworkConfig::new(self.d_hidden, self.d_hidden)
                    .with_dropout(self.dropout)
                    .init()
            })
            .collect();

        VariableSelectionNetwork {
            joint_grn,
            var_grns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    fn variables<const D: usize>(n: usize, shape: [usize; D]) -> Vec<Tensor<TestBackend, D>> {
        (0..n)
            .map(|_| Tensor::random(shape, Distribution::Normal(0.0, 1.0)))
            .collect()
    }

    fn assert_sums_to_one(weights: Vec<f32>, n: usize) {
        for row in weights.chunks(n) {
            let total: f32 = row.iter().sum();
            assert!((total - 1.0).abs() < 1e-5, "weights sum to {total}");
        }
    }

    #[test]
    fn temporal_weights_sum_to_one() {
        let vsn = VariableSelectionNetworkConfig::new(16, 4)
            .with_context(true)
            .init::<TestBackend>();
        let context = Tensor::random([3, 16], Distribution::Normal(0.0, 1.0));

        let (fused, weights) = vsn.forward(variables(4, [3, 5, 16]), Some(context), None);

        assert_eq!(fused.dims(), [3, 5, 16]);
        assert_eq!(weights.dims(), [3, 5, 4]);
        assert_sums_to_one(weights.into_data().value, 4);
    }

    #[test]
    fn static_weights_sum_to_one() {
        let vsn = VariableSelectionNetworkConfig::new(8, 3).init::<TestBackend>();

        let (fused, weights) = vsn.forward(variables(3, [2, 8]), None, None);

        assert_eq!(fused.dims(), [2, 8]);
        assert_eq!(weights.dims(), [2, 3]);
        assert_sums_to_one(weights.into_data().value, 3);
    }

    #[test]
    fn single_variable_has_unit_weight() {
        let vsn = VariableSelectionNetworkConfig::new(8, 1).init::<TestBackend>();

        let (_, weights) = vsn.forward(variables(1, [2, 6, 8]), None, None);

        assert!(weights
            .into_data()
            .value
            .iter()
            .all(|w| (w - 1.0).abs() < 1e-6));
    }

    #[test]
    #[should_panic(expected = "variable count")]
    fn rejects_wrong_variable_count() {
        let vsn = VariableSelectionNetworkConfig::new(8, 3).init::<TestBackend>();
        vsn.forward(variables(2, [2, 8]), None, None);
    }
}
