// src/error.rs

use thiserror::Error;

/// Errors surfaced by engine construction and iteration.
///
/// The stencil kernels themselves never fail; everything here originates
/// from configuration validation, allocation, or extension hooks, and is
/// reported at the `new` / `iterate_ts` boundary with no partial state.
#[derive(Debug, Error)]
pub enum FdtdError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("field allocation failed: {0}")]
    Alloc(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("extension '{name}' failed at timestep {timestep}: {reason}")]
    Extension {
        name: &'static str,
        timestep: usize,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, FdtdError>;
