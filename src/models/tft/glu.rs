use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Linear map to twice the output width followed by `value * sigmoid(gate)`.
#[derive(Module, Debug)]
pub struct GatedLinearUnit<B: Backend> {
    lin: Linear<B>,
}

impl<B: Backend> GatedLinearUnit<B> {
    pub fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let x = self.lin.forward(x);

        let (value, gate) = {
            let mut chunks = x.chunk(2, D - 1);
            let value = chunks.remove(0);
            let gate = chunks.remove(0);
            (value, gate)
        };

        value * activation::sigmoid(gate)
    }
}

#[derive(Config, Debug)]
pub struct GatedLinearUnitConfig {
    d_input: usize,
    d_output: usize,
}

impl GatedLinearUnitConfig {
    pub fn init<B: Backend>(&self) -> GatedLinearUnit<B> {
        GatedLinearUnit {
            lin: LinearConfig::new(self.d_input, self.d_output * 2).init(),
        }
    }
}
