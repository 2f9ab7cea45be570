use chrono::NaiveDate;
use thiserror::Error;

use crate::hierarchy::tree::TreeError;

/// Outcomes of on-demand artifact generation that a caller is expected to handle. None of them
/// affect the capture daemon, which never shares memory with generation.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Nothing to generate for {date}: no typed text was recorded")]
    NothingToGenerate { date: NaiveDate },

    #[error("Generation was cancelled")]
    Cancelled,

    #[error("Generated tree is malformed: {0}")]
    InvalidTree(#[from] TreeError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
