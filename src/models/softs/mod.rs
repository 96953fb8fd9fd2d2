//! SOFTS: efficient multivariate forecasting with series-core fusion.
//!
//! Han et al., "SOFTS: Efficient Multivariate Time Series Forecasting with
//! Series-Core Fusion".

pub mod encoder;
pub mod model;
pub mod stad;

pub use model::{Softs, SoftsConfig};
pub use stad::{Stad, StadConfig};
