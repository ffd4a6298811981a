//! The [`FamError`] `enum` definition and error messages.
//!
use std::num::{ParseFloatError, ParseIntError};
use std::path::PathBuf;
use thiserror::Error;

/// The [`FamError`] defines the standard set of errors that should
/// be passed to the user.
#[derive(Debug, Error)]
pub enum FamError {
    // IO related errors
    #[error("File reading error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Input '{}' does not exist or cannot be opened", .0.display())]
    ResourceNotFound(PathBuf),

    // Structural errors against the positional format. These carry the
    // 1-based line number, a description of what was expected there, and
    // the text actually found.
    #[error("Format error at line {line}: expected {expected}, found '{found}'")]
    FormatError {
        line: usize,
        expected: String,
        found: String,
    },
    #[error("Format error at line {line}: expected {expected}, but the file ends before it")]
    UnexpectedEnd { line: usize, expected: String },
    #[error("Count mismatch for {item_type}: declared {declared}, found {found}")]
    CountMismatch {
        item_type: &'static str,
        declared: usize,
        found: usize,
    },

    // Well-formed input outside the supported scope.
    #[error("Unsupported .fam feature: {0}")]
    UnsupportedFeature(&'static str),

    // DVI parent-sex inference failures.
    #[error("Cannot resolve the sex of parent '{0}' from co-parent evidence")]
    AmbiguousParentSex(String),

    // DVI option/content mismatch.
    #[error("DVI section requested, but the file contains no [DVI] line")]
    DviNotFound,
    #[error("Malformed DVI section: {0}")]
    DviStructure(String),

    #[error("Integer parsing error: {0}")]
    ParseIntError(#[from] ParseIntError),
    #[error("Float parsing error: {0}")]
    ParseFloatError(#[from] ParseFloatError),

    // Mutation model construction errors.
    #[error("Invalid mutation model: {0}")]
    InvalidMutationModel(String),
    #[error("Mutation matrix cannot be stabilized: {0}")]
    NotStabilizable(String),

    // Command line tool related errors
    #[error("TSV writing error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Command line argument error: {0}")]
    ArgumentError(#[from] clap::error::Error),
}

impl FamError {
    /// Build a [`FamError::FormatError`] from a line number, an expectation
    /// description, and the offending text.
    pub fn format(line: usize, expected: impl Into<String>, found: impl Into<String>) -> Self {
        FamError::FormatError {
            line,
            expected: expected.into(),
            found: found.into(),
        }
    }
}
