//! The DVI (Disaster Victim Identification) section: bracket-tree parsing
//! and interpretation.

pub mod interpret;
pub mod tree;

pub use interpret::{interpret_dvi, DviData, DviFamily, DviUnidentified};
pub use tree::{parse_dvi_tree, DviNode};
