
pub mod commands;
pub mod cursor;
pub mod error;
pub mod io;
pub mod materialize;
pub mod mutate;
pub mod parsers;
pub mod pedigree;
pub mod reporting;
pub mod test_utilities;

pub mod prelude {
    pub use crate::error::FamError;
    pub use crate::parsers::{
        read_fam, read_fam_lines, FamOutput, FamParams, FamResult, ReadFamOptions,
    };
    pub use crate::pedigree::{FamPedigree, GenotypeTable, PedigreeSet, Sex};
}
