use burn::tensor::{backend::Backend, Tensor};

/// `x` for positive inputs, `alpha * (exp(x) - 1)` otherwise.
pub fn elu<B: Backend, const D: usize>(x: Tensor<B, D>, alpha: f32) -> Tensor<B, D> {
    let negative = x.clone().lower_equal_elem(0.0);
    let saturated = (x.clone().exp() - 1.0) * alpha;

    x.mask_where(negative, saturated)
}
