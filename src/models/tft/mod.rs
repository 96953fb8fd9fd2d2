//! Temporal Fusion Transformer.
//!
//! Lim et al., "Temporal Fusion Transformers for interpretable multi-horizon
//! time series forecasting".

pub mod attention;
pub mod embedding;
pub mod glu;
pub mod grn;
pub mod model;
pub mod sce;
pub mod tce;
pub mod tfd;
pub mod vsn;

pub use model::{
    synthesize_futr_exog, TemporalFusionTransformer, TemporalFusionTransformerConfig,
    TftInterpretation,
};
