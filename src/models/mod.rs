use burn::tensor::{backend::Backend, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::WindowsBatch;
use crate::error::Result;

pub mod softs;
pub mod tft;

/// Execution mode of a forward pass. Components whose computation differs
/// between training and inference branch on it; the seed makes training
/// passes reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train { seed: u64 },
    Eval,
}

impl Mode {
    /// Source of every random draw of a forward pass (dropout masks, STAD
    /// sampling); `None` in evaluation, where the pass is deterministic.
    pub fn rng(&self) -> Option<StdRng> {
        match self {
            Mode::Train { seed } => Some(StdRng::seed_from_u64(*seed)),
            Mode::Eval => None,
        }
    }
}

/// A forecasting model as seen by the training and evaluation code that
/// drives it.
pub trait Forecaster<B: Backend> {
    fn horizon(&self) -> usize;

    /// Forecast `[B, h, ·]` for one batch of windows.
    fn forecast(&self, batch: WindowsBatch<B>, mode: Mode) -> Result<Tensor<B, 3>>;
}
