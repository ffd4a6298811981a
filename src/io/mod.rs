//! Types and methods for reading and parsing input and writing output.

pub mod file;

pub use file::{InputFile, OutputFile};
