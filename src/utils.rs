use burn::tensor::{backend::Backend, Data, Shape, Tensor};

/// Splits `x` along `dim` into consecutive pieces of the given sizes.
/// A negative `dim` counts from the last axis.
pub fn split<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    sizes: &[usize],
    dim: i32,
) -> Vec<Tensor<B, D>> {
    let dim: usize = if dim < 0 {
        (D as i32 + dim) as usize
    } else {
        dim as usize
    };

    let dim_size = x.dims()[dim];
    assert_eq!(
        sizes.iter().sum::<usize>(),
        dim_size,
        "split sizes must cover the whole axis"
    );

    let mut current_idx: usize = 0;
    sizes
        .iter()
        .map(|s| {
            let mut ranges = x.dims().map(|x| 0..x);
            ranges[dim] = current_idx..current_idx + s;
            current_idx += s;
            x.clone().slice(ranges)
        })
        .collect()
}

/// Inverse of `Tensor::stack`: removes `dim` and returns one tensor per index.
/// `D2` must be `D - 1`.
pub fn unstack<B: Backend, const D: usize, const D2: usize>(
    x: Tensor<B, D>,
    dim: usize,
) -> Vec<Tensor<B, D2>> {
    let count = x.dims()[dim];

    x.chunk(count, dim)
        .into_iter()
        .map(|slice| slice.squeeze(dim))
        .collect()
}

/// Replaces NaN with zero and clamps infinities to the finite `f32` range.
pub fn nan_to_num<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let nan = x.clone().equal(x.clone()).bool_not();

    x.mask_fill(nan, 0.0).clamp(f32::MIN, f32::MAX)
}

/// Additive causal mask `[len, len]`: zero on and below the diagonal,
/// `-inf` strictly above it.
pub fn causal_mask<B: Backend>(len: usize) -> Tensor<B, 2> {
    let values: Vec<f32> = (0..len)
        .flat_map(|i| (0..len).map(move |j| if j > i { f32::NEG_INFINITY } else { 0.0 }))
        .collect();

    let data = Data::new(values, Shape::new([len, len]));
    Tensor::from_data(data.convert())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn split_by_sizes() {
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0, 4.0, 5.0]]);
        let parts = split(x, &[2, 2, 1], -1);

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].dims(), [1, 2]);
        assert_eq!(parts[2].dims(), [1, 1]);
        parts[1]
            .clone()
            .into_data()
            .assert_approx_eq(&Data::from([[3.0, 4.0]]), 6);
    }

    #[test]
    fn unstack_removes_axis() {
        let x = Tensor::<TestBackend, 3>::zeros([2, 3, 4]);
        let parts: Vec<Tensor<TestBackend, 2>> = unstack(x, 1);

        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.dims() == [2, 4]));
    }

    #[test]
    fn nan_to_num_sanitizes() {
        let x = Tensor::<TestBackend, 1>::from_floats([f32::NAN, f32::INFINITY, -1.0]);
        let values = nan_to_num(x).into_data().value;

        assert_eq!(values[0], 0.0);
        assert_eq!(values[1], f32::MAX);
        assert_eq!(values[2], -1.0);
    }

    #[test]
    fn causal_mask_is_strictly_upper_triangular() {
        let mask = causal_mask::<TestBackend>(3).into_data().value;

        for i in 0..3 {
            for j in 0..3 {
                let v = mask[i * 3 + j];
                if j > i {
                    assert_eq!(v, f32::NEG_INFINITY);
                } else {
                    assert_eq!(v, 0.0);
                }
            }
        }
    }
}
