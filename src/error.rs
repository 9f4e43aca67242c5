//! Error types for the Pvstring solver.
//!
//! This module provides a unified error type [`PvError`] that covers all
//! error conditions that can occur while parsing a panel description,
//! assembling a panel and running a solve.
//!
//! Numerical trouble during an individual solve (non-convergence, a singular
//! Jacobian) is deliberately *not* an error: a sweep wants to keep going, so
//! those conditions are reported through the returned operating point and a
//! warning instead.

use thiserror::Error;

/// Result type alias using [`PvError`].
pub type Result<T> = std::result::Result<T, PvError>;

/// Unified error type for all Pvstring operations.
#[derive(Error, Debug)]
pub enum PvError {
    // ============ Description Parsing Errors ============
    /// Error while parsing the panel description text
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Description parsed but does not describe a usable panel
    #[error("Invalid panel description: {message}")]
    InvalidDescription { message: String },

    // ============ Solver Errors ============
    /// Jacobian is singular and cannot be factored
    #[error("Singular Jacobian - panel state produced a degenerate system")]
    SingularMatrix,

    /// Invalid sweep parameters
    #[error("Invalid sweep parameters: {message}")]
    InvalidSweep { message: String },

    // ============ I/O Errors ============
    /// Error reading the panel description file
    #[error("Failed to read panel file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error writing an output file
    #[error("Failed to write output file '{path}': {source}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PvError {
    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid-description error
    pub fn invalid_description(message: impl Into<String>) -> Self {
        Self::InvalidDescription {
            message: message.into(),
        }
    }

    /// Create an invalid-sweep error
    pub fn invalid_sweep(message: impl Into<String>) -> Self {
        Self::InvalidSweep {
            message: message.into(),
        }
    }
}
