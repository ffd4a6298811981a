//! Types for standardized reports to the user about parsing operations.
//!
//! The `.fam` format tolerates a handful of recoverable data problems
//! (reserved allele labels, stepwise-incompatible allele sets, nonzero
//! theta corrections). Parsing proceeds with a well-defined substitution,
//! and each substitution is recorded here so the caller can inspect or
//! display it, rather than being printed to a global stream.

/// The [`CommandOutput<U>`] type output is generic over some data output
/// from a command, and a [`Report`] that reports information to the user.
#[allow(unused)]
pub struct CommandOutput<U> {
    pub value: U,
    pub report: Report,
}

impl<U> CommandOutput<U> {
    pub fn new(value: U, report: Report) -> Self {
        Self { value, report }
    }
}

/// A type to (semi) standardize reporting to the user.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Report {
    entries: Vec<String>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_issue(&mut self, message: String) {
        self.entries.push(message)
    }

    /// Fold another report's entries into this one.
    pub fn merge(&mut self, other: Report) {
        self.entries.extend(other.entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Write all entries to standard error, one per line.
    pub fn narrate(&self) {
        for entry in &self.entries {
            eprintln!("warning: {}", entry);
        }
    }
}
