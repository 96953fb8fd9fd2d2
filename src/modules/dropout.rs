use burn::config::Config;
use burn::module::Module;
use burn::tensor::{backend::Backend, Data, Tensor};
use rand::distributions::{Bernoulli, Distribution};
use rand::rngs::StdRng;

/// Inverted dropout driven by the forward pass' rng instead of backend state:
/// without an rng (inference) it is the identity, with one it zeroes each
/// element with probability `prob` and rescales the rest by `1 / (1 - prob)`.
#[derive(Module, Debug, Clone)]
pub struct Dropout {
    prob: f64,
}

impl Dropout {
    pub fn forward<B: Backend, const D: usize>(
        &self,
        x: Tensor<B, D>,
        rng: Option<&mut StdRng>,
    ) -> Tensor<B, D> {
        let rng = match rng {
            Some(rng) if self.prob > 0.0 => rng,
            _ => return x,
        };
        // The config keeps `prob` in [0, 1), so the keep probability is valid.
        let keep = match Bernoulli::new(1.0 - self.prob) {
            Ok(keep) => keep,
            Err(_) => return x,
        };

        let scale = (1.0 / (1.0 - self.prob)) as f32;
        let shape = x.shape();
        let mask: Vec<f32> = (0..shape.num_elements())
            .map(|_| if keep.sample(rng) { scale } else { 0.0 })
            .collect();

        let mask: Tensor<B, D> =
            Tensor::from_data(Data::new(mask, shape).convert()).to_device(&x.device());
        x * mask
    }
}

#[derive(Config, Debug)]
pub struct DropoutConfig {
    prob: f64,
}

impl DropoutConfig {
    pub fn init(&self) -> Dropout {
        assert!(
            (0.0..1.0).contains(&self.prob),
            "dropout probability must be in [0, 1)"
        );
        Dropout { prob: self.prob }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution as TensorDistribution;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    #[test]
    fn identity_without_rng() {
        let dropout = DropoutConfig::new(0.5).init();
        let x = Tensor::<Autodiff<TestBackend>, 2>::random([4, 8], TensorDistribution::Normal(0.0, 1.0));

        let y = dropout.forward(x.clone(), None);
        assert_eq!(y.into_data(), x.into_data());
    }

    #[test]
    fn drops_and_rescales_with_rng() {
        let dropout = DropoutConfig::new(0.5).init();
        let x = Tensor::<TestBackend, 2>::ones([16, 16]);
        let mut rng = StdRng::seed_from_u64(0);

        let values = dropout.forward(x, Some(&mut rng)).into_data().value;

        assert!(values.iter().all(|v| *v == 0.0 || (*v - 2.0).abs() < 1e-6));
        assert!(values.iter().any(|v| *v == 0.0));
        assert!(values.iter().any(|v| *v != 0.0));
    }

    #[test]
    fn same_seed_same_mask() {
        let dropout = DropoutConfig::new(0.3).init();
        let x = Tensor::<TestBackend, 3>::ones([2, 5, 7]);

        let a = dropout.forward(x.clone(), Some(&mut StdRng::seed_from_u64(4)));
        let b = dropout.forward(x, Some(&mut StdRng::seed_from_u64(4)));
        assert_eq!(a.into_data(), b.into_data());
    }

    #[test]
    #[should_panic(expected = "dropout probability")]
    fn rejects_probability_of_one() {
        DropoutConfig::new(1.0).init();
    }
}
