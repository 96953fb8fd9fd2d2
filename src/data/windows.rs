use burn::tensor::{backend::Backend, Tensor};

/// One batch of forecasting windows, as produced by the external windowing
/// code. `L` is the input size and `h` the horizon.
#[derive(Clone, Debug)]
pub struct WindowsBatch<B: Backend> {
    pub insample_y: Tensor<B, 3>,         // [B, L, Z]
    pub futr_exog: Option<Tensor<B, 3>>, // [B, L + h, K]
    pub hist_exog: Option<Tensor<B, 3>>, // [B, L, O]
    pub stat_exog: Option<Tensor<B, 2>>, // [B, S]
}

impl<B: Backend> WindowsBatch<B> {
    pub fn new(insample_y: Tensor<B, 3>) -> Self {
        Self {
            insample_y,
            futr_exog: None,
            hist_exog: None,
            stat_exog: None,
        }
    }

    pub fn with_futr_exog(mut self, futr_exog: Tensor<B, 3>) -> Self {
        self.futr_exog = Some(futr_exog);
        self
    }

    pub fn with_hist_exog(mut self, hist_exog: Tensor<B, 3>) -> Self {
        self.hist_exog = Some(hist_exog);
        self
    }

    pub fn with_stat_exog(mut self, stat_exog: Tensor<B, 2>) -> Self {
        self.stat_exog = Some(stat_exog);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.insample_y.dims()[0]
    }
}
