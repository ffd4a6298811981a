//! Parsers for the sections of a `.fam` file, and the [`read_fam`] entry
//! point that sequences them.
//!
//! A `.fam` file has three parts: the main (pedigree) section, the marker
//! database, and an optional bracketed DVI section. The first two are
//! positional and share one moving cursor; the DVI section is located by
//! scanning for its literal `[DVI]` header and parsed into a named tree.
//! One call to [`read_fam`] performs one full pass and returns an owned
//! result; nothing persists between calls.

pub mod dvi;
pub mod main_section;
pub mod markers;

use indexmap::IndexMap;
use std::path::PathBuf;

use crate::cursor::LineStream;
use crate::error::FamError;
use crate::io::InputFile;
use crate::mutate::FallbackModel;
use crate::pedigree::{GenotypeTable, PedigreeSet};
use crate::reporting::Report;

use dvi::{interpret_dvi, parse_dvi_tree, DviFamily, DviUnidentified};
use main_section::parse_main_section;
use markers::{parse_marker_database, Locus};

/// The literal line opening the DVI section.
pub const DVI_MARKER: &str = "[DVI]";

/// Configuration for one [`read_fam`] call.
#[derive(Clone, Debug)]
pub struct ReadFamOptions {
    /// `Some(true)` requires a DVI section (error if absent), `Some(false)`
    /// ignores one, `None` auto-detects.
    pub use_dvi: Option<bool>,
    /// Label every locus as X-linked.
    pub x_chromosome: bool,
    /// Id prefix for founder parents synthesized by the materializer.
    pub founder_prefix: String,
    /// Model substituted when a stepwise model is incompatible with the
    /// observed allele set.
    pub fallback_model: FallbackModel,
    /// Unwrap a one-element pedigree collection to [`PedigreeSet::Single`].
    pub simplify_single: bool,
    /// Collapse duplicated DVI pedigree variants.
    pub dedup_pedigrees: bool,
    /// Return the side-channel parameter bundle.
    pub include_params: bool,
    /// Narrate accumulated diagnostics to standard error.
    pub verbose: bool,
}

impl Default for ReadFamOptions {
    fn default() -> Self {
        Self {
            use_dvi: None,
            x_chromosome: false,
            founder_prefix: "added".to_string(),
            fallback_model: FallbackModel::Equal,
            simplify_single: true,
            dedup_pedigrees: true,
            include_params: false,
            verbose: false,
        }
    }
}

/// The side-channel parameter bundle, returned only on request.
#[derive(Clone, Debug, PartialEq)]
pub struct FamParams {
    pub version: String,
    pub has_dvi: bool,
    pub database_name: String,
    /// Per-locus database sizes, keyed by locus name.
    pub database_sizes: IndexMap<String, u64>,
    /// Per-locus dropout probabilities.
    pub dropouts: IndexMap<String, f64>,
    /// Per-locus minor-allele frequencies.
    pub minor_afs: IndexMap<String, f64>,
    /// Per-individual "consider dropout" flags, in file order.
    pub dropout_flags: IndexMap<String, bool>,
    pub theta: Option<f64>,
}

/// The shape of the recovered data: a flat pedigree collection for
/// ordinary files, family-keyed records for DVI files.
#[derive(Clone, Debug, PartialEq)]
pub enum FamResult {
    Pedigrees {
        pedigrees: PedigreeSet,
        datamatrix: GenotypeTable,
    },
    Dvi {
        families: IndexMap<String, DviFamily>,
        unidentified: Option<DviUnidentified>,
    },
}

/// Everything one [`read_fam`] call produces.
#[derive(Clone, Debug)]
pub struct FamOutput {
    pub version: String,
    pub loci: Vec<Locus>,
    pub result: FamResult,
    pub params: Option<FamParams>,
    /// Non-fatal data-integrity diagnostics accumulated during the parse.
    pub report: Report,
}

/// Read and parse a `.fam` file (plaintext or gzipped).
pub fn read_fam(
    filepath: impl Into<PathBuf>,
    options: &ReadFamOptions,
) -> Result<FamOutput, FamError> {
    let stream = InputFile::new(filepath).read_lines()?;
    read_fam_lines(&stream, options)
}

/// Parse an already loaded line stream.
pub fn read_fam_lines(
    stream: &LineStream,
    options: &ReadFamOptions,
) -> Result<FamOutput, FamError> {
    let dvi_start = stream.find(DVI_MARKER);
    let use_dvi = match options.use_dvi {
        Some(true) if dvi_start.is_none() => return Err(FamError::DviNotFound),
        Some(requested) => requested,
        None => dvi_start.is_some(),
    };

    let mut report = Report::new();
    let mut cursor = stream.cursor();
    let main = parse_main_section(&mut cursor, &mut report, options.include_params)?;
    let db = parse_marker_database(
        &mut cursor,
        &mut report,
        options.fallback_model,
        options.x_chromosome,
    )?;

    let params = options.include_params.then(|| FamParams {
        version: main.version.clone(),
        has_dvi: dvi_start.is_some(),
        database_name: db.name.clone(),
        database_sizes: db
            .loci
            .iter()
            .filter_map(|l| l.database_size.map(|v| (l.name.clone(), v)))
            .collect(),
        dropouts: db
            .loci
            .iter()
            .filter_map(|l| l.dropout.map(|v| (l.name.clone(), v)))
            .collect(),
        minor_afs: db
            .loci
            .iter()
            .filter_map(|l| l.minor_af.map(|v| (l.name.clone(), v)))
            .collect(),
        dropout_flags: main.dropout_flags.clone(),
        theta: main.theta,
    });

    let result = if use_dvi {
        let start = dvi_start.expect("use_dvi implies a located marker");
        let tree = parse_dvi_tree(stream, start)?;
        let data = interpret_dvi(&tree, options.dedup_pedigrees)?;
        FamResult::Dvi {
            families: data.families,
            unidentified: data.unidentified,
        }
    } else {
        let datamatrix = main.genotypes.resolve(&db.loci)?;
        let pedigrees = if options.simplify_single {
            main.pedigrees.simplify()
        } else {
            main.pedigrees
        };
        FamResult::Pedigrees {
            pedigrees,
            datamatrix,
        }
    };

    if options.verbose {
        report.narrate();
    }

    Ok(FamOutput {
        version: main.version,
        loci: db.loci,
        result,
        params,
        report,
    })
}
