use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForecastError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("hidden size {hidden_size} is not divisible by the number of heads {n_head}")]
    HeadsNotDivisible { hidden_size: usize, n_head: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("`{input}` has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        input: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("`{0}` is required by the model configuration but missing from the batch")]
    MissingInput(&'static str),

    #[error("`{0}` is present in the batch but the model was configured without it")]
    UnexpectedInput(&'static str),
}

/// Checks `found` against `expected`; `None` entries match any size.
pub(crate) fn check_dims<const D: usize>(
    input: &'static str,
    expected: [Option<usize>; D],
    found: [usize; D],
) -> Result<()> {
    let matches = expected
        .iter()
        .zip(found.iter())
        .all(|(e, f)| e.map_or(true, |e| e == *f));

    if matches {
        return Ok(());
    }

    Err(ForecastError::ShapeMismatch {
        input,
        expected: expected
            .iter()
            .zip(found.iter())
            .map(|(e, f)| e.unwrap_or(*f))
            .collect(),
        found: found.to_vec(),
    })
}
