//! Neural forecasting models on burn: the Temporal Fusion Transformer and
//! SOFTS, sharing one batch type, error type and loss interface.

pub mod data;
pub mod error;
pub mod losses;
pub mod models;
pub mod modules;
pub mod utils;

pub use data::WindowsBatch;
pub use error::{ForecastError, Result};
pub use losses::{ForecastLoss, Mae, QuantileLoss};
pub use models::softs::{Softs, SoftsConfig};
pub use models::tft::{TemporalFusionTransformer, TemporalFusionTransformerConfig};
pub use models::{Forecaster, Mode};
