use thiserror::Error;

use crate::session::Mode;

pub type BoothResult<T> = Result<T, BoothError>;

/// Errors surfaced by the booth core.
///
/// Only `Setup` is fatal. Everything else is reported to the user and the
/// session carries on in whatever state it was in.
#[derive(Error, Debug)]
pub enum BoothError {
    /// Camera or device unavailable at session start
    #[error("setup failed: {0}")]
    Setup(String),

    /// Selection rejected; state is unchanged
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// Transition not allowed from the current mode
    #[error("cannot {op} while {mode}")]
    InvalidTransition { op: &'static str, mode: Mode },

    /// Snapshot requested before anything was composited
    #[error("nothing has been presented yet")]
    NothingPresented,

    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("catalog error: {0}")]
    Catalog(String),
}

impl BoothError {
    pub fn invalid_selection(msg: impl Into<String>) -> Self {
        Self::InvalidSelection(msg.into())
    }

    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }
}
