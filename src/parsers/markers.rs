//! Parser for the marker (locus) database section of a `.fam` file.
//!
//! Each locus block is 13 header lines followed by `2*nAll` alternating
//! allele/frequency lines, where `nAll` is taken from the free-text info
//! line rather than the declared slot count (the declared count includes a
//! reserved silent-allele slot). Validation may substitute the caller's
//! fallback mutation model; every substitution is reported, never silent.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cursor::{extract_labeled_number, is_true_flag, LineCursor};
use crate::error::FamError;
use crate::mutate::{build_matrix, stabilize, FallbackModel, ModelKind, MutationModel};
use crate::reporting::Report;

/// A fully resolved locus: allele/frequency table plus one mutation model
/// per sex.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Locus {
    pub name: String,
    /// Allele label -> population frequency, in file order.
    pub alleles: IndexMap<String, f64>,
    pub female_model: MutationModel,
    pub male_model: MutationModel,
    pub x_linked: bool,
    pub database_size: Option<u64>,
    pub dropout: Option<f64>,
    pub minor_af: Option<f64>,
}

impl Locus {
    pub fn n_alleles(&self) -> usize {
        self.alleles.len()
    }

    /// The label at 1-based allele index `i`.
    pub fn allele_label(&self, i: usize) -> Option<&str> {
        if i == 0 {
            return None;
        }
        self.alleles.get_index(i - 1).map(|(label, _)| label.as_str())
    }

    pub fn labels(&self) -> Vec<String> {
        self.alleles.keys().cloned().collect()
    }

    pub fn frequencies(&self) -> Vec<f64> {
        self.alleles.values().copied().collect()
    }
}

/// The parsed marker database: its declared name plus the locus list.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MarkerDatabase {
    pub name: String,
    pub loci: Vec<Locus>,
}

/// Parse the marker database section: a database-name line, a locus-count
/// line, then that many locus blocks. The cursor is left on the first line
/// after the last block.
pub fn parse_marker_database(
    cursor: &mut LineCursor,
    report: &mut Report,
    fallback: FallbackModel,
    x_linked: bool,
) -> Result<MarkerDatabase, FamError> {
    let name = cursor.next_str("the frequency database name")?.to_string();
    let n_loci = cursor.next_count("the number of loci")?;
    let mut loci = Vec::with_capacity(n_loci);
    for _ in 0..n_loci {
        loci.push(parse_locus(cursor, report, fallback, x_linked)?);
    }
    Ok(MarkerDatabase { name, loci })
}

/// Raw per-sex model parameters before validation.
#[derive(Clone, Copy, Debug)]
struct RawModel {
    code: i64,
    rate: f64,
    rate2: f64,
    range: f64,
}

impl RawModel {
    fn kind(&self) -> ModelKind {
        match self.code {
            0 => ModelKind::Equal,
            1 => ModelKind::Proportional,
            _ => ModelKind::Stepwise,
        }
    }

    fn is_stationary(&self) -> bool {
        self.code == 3
    }
}

fn parse_locus(
    cursor: &mut LineCursor,
    report: &mut Report,
    fallback: FallbackModel,
    x_linked: bool,
) -> Result<Locus, FamError> {
    let name = cursor.line_at(0, "a locus name")?.to_string();
    let female_rate = cursor.read_float(1, "the female mutation rate")?;
    let male_rate = cursor.read_float(2, "the male mutation rate")?;
    let female_code = cursor.read_int_max(3, "the female mutation model code", 4)?;
    let male_code = cursor.read_int_max(4, "the male mutation model code", 4)?;
    // Declared allele count including the silent-allele slot; the info
    // line below is authoritative for the list that follows.
    let _n_with_silent = cursor.read_count(5, "the allele count")?;
    let female_range = cursor.read_float(6, "the female stepwise range")?;
    let male_range = cursor.read_float(7, "the male stepwise range")?;
    let female_rate2 = cursor.read_float(8, "the female secondary mutation rate")?;
    let male_rate2 = cursor.read_float(9, "the male secondary mutation rate")?;
    if is_true_flag(cursor.line_at(10, "the silent-frequency flag")?) {
        return Err(FamError::UnsupportedFeature("silent allele frequencies"));
    }
    let _silent_freq = cursor.line_at(11, "the silent allele frequency")?;
    let info = cursor.line_at(12, "the locus info line")?;

    let n_alleles = info
        .split_whitespace()
        .next()
        .and_then(|tok| tok.parse::<usize>().ok())
        .ok_or_else(|| {
            FamError::format(cursor.position() + 12, "a leading allele count", info)
        })?;
    let database_size = extract_labeled_number(info, "DatabaseSize").map(|v| v as u64);
    let dropout = extract_labeled_number(info, "Dropout");
    let minor_af = extract_labeled_number(info, "MinorAF");

    let mut alleles: IndexMap<String, f64> = IndexMap::with_capacity(n_alleles);
    for i in 0..n_alleles {
        let offset = 13 + 2 * i;
        let mut label = cursor.line_at(offset, "an allele label")?.trim().to_string();
        let freq = cursor.read_float(offset + 1, "an allele frequency")?;
        if label == "0" {
            report.add_issue(format!(
                "locus {name}: allele label '0' collides with the no-allele \
                 sentinel; renamed to 'z'"
            ));
            label = "z".to_string();
        }
        if alleles.insert(label.clone(), freq).is_some() {
            return Err(FamError::format(
                cursor.position() + offset,
                "a unique allele label",
                label,
            ));
        }
    }
    cursor.advance(13 + 2 * n_alleles);

    let mut female = RawModel {
        code: female_code,
        rate: female_rate,
        rate2: female_rate2,
        range: female_range,
    };
    let mut male = RawModel {
        code: male_code,
        rate: male_rate,
        rate2: male_rate2,
        range: male_range,
    };

    // A stepwise model needs numeric, ordered allele labels. If any allele
    // fails, both sexes fall back together; a one-sex fix is not supported.
    if female.code > 1 || male.code > 1 {
        if let Some((allele, reason)) = stepwise_incompatibility(&alleles) {
            report.add_issue(format!(
                "locus {name}: allele '{allele}' {reason}, which a stepwise \
                 model cannot represent; using the {fallback:?} model for both sexes"
            ));
            female.code = fallback_code(fallback);
            male.code = fallback_code(fallback);
        }
    }

    let labels: Vec<String> = alleles.keys().cloned().collect();
    let freqs: Vec<f64> = alleles.values().copied().collect();
    let female_model = resolve_model(&name, "female", female, &labels, &freqs, fallback, report)?;
    let male_model = resolve_model(&name, "male", male, &labels, &freqs, fallback, report)?;

    Ok(Locus {
        name,
        alleles,
        female_model,
        male_model,
        x_linked,
        database_size,
        dropout,
        minor_af,
    })
}

fn fallback_code(fallback: FallbackModel) -> i64 {
    match fallback {
        FallbackModel::Equal => 0,
        FallbackModel::Proportional => 1,
    }
}

/// The first stepwise-compatibility violation, checked rule by rule:
/// non-numeric labels first, then values below one, then labels with more
/// than one decimal place.
fn stepwise_incompatibility(alleles: &IndexMap<String, f64>) -> Option<(String, &'static str)> {
    for label in alleles.keys() {
        if label.parse::<f64>().is_err() {
            return Some((label.clone(), "is not numeric"));
        }
    }
    for label in alleles.keys() {
        if label.parse::<f64>().is_ok_and(|v| v < 1.0) {
            return Some((label.clone(), "is less than 1"));
        }
    }
    for label in alleles.keys() {
        if let Some((_, frac)) = label.split_once('.') {
            if frac.len() > 1 {
                return Some((label.clone(), "has more than one decimal place"));
            }
        }
    }
    None
}

#[allow(clippy::too_many_arguments)]
fn resolve_model(
    locus: &str,
    sex: &str,
    raw: RawModel,
    labels: &[String],
    freqs: &[f64],
    fallback: FallbackModel,
    report: &mut Report,
) -> Result<MutationModel, FamError> {
    let kind = raw.kind();
    let matrix = build_matrix(kind, labels, freqs, raw.rate, raw.rate2, raw.range)?;

    if kind == ModelKind::Stepwise && raw.is_stationary() {
        match stabilize(&matrix, freqs) {
            Ok(stabilized) => {
                return Ok(MutationModel {
                    kind,
                    stationary: true,
                    rate: raw.rate,
                    rate2: raw.rate2,
                    range: raw.range,
                    matrix: stabilized,
                })
            }
            Err(err) => {
                report.add_issue(format!(
                    "locus {locus}: the {sex} stationary stepwise matrix could \
                     not be stabilized ({err}); using the {fallback:?} model instead"
                ));
                let kind = fallback.kind();
                let matrix = build_matrix(kind, labels, freqs, raw.rate, raw.rate2, raw.range)?;
                return Ok(MutationModel {
                    kind,
                    stationary: false,
                    rate: raw.rate,
                    rate2: raw.rate2,
                    range: raw.range,
                    matrix,
                });
            }
        }
    }

    Ok(MutationModel {
        kind,
        stationary: false,
        rate: raw.rate,
        rate2: raw.rate2,
        range: raw.range,
        matrix,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::LineStream;
    use crate::test_utilities::{locus_block, LocusSpec};

    fn parse_one(spec: LocusSpec) -> (Result<MarkerDatabase, FamError>, Report) {
        let mut lines = vec!["NorwegianFrequencies".to_string(), "1".to_string()];
        lines.extend(locus_block(&spec));
        let stream = LineStream::new(lines);
        let mut cursor = stream.cursor();
        let mut report = Report::new();
        let result =
            parse_marker_database(&mut cursor, &mut report, FallbackModel::Equal, false);
        (result, report)
    }

    #[test]
    fn test_basic_locus() {
        let spec = LocusSpec::equal("VWA", &[("14", 0.4), ("15", 0.6)], 0.001);
        let (result, report) = parse_one(spec);
        let db = result.unwrap();
        assert_eq!(db.name, "NorwegianFrequencies");
        assert_eq!(db.loci.len(), 1);
        let locus = &db.loci[0];
        assert_eq!(locus.name, "VWA");
        assert_eq!(locus.n_alleles(), 2);
        assert_eq!(locus.allele_label(1), Some("14"));
        assert_eq!(locus.allele_label(3), None);
        assert_eq!(locus.female_model.kind, ModelKind::Equal);
        assert!(report.is_empty());
    }

    #[test]
    fn test_info_line_metadata() {
        let mut spec = LocusSpec::equal("TH01", &[("6", 0.3), ("7", 0.7)], 0.001);
        spec.database_size = Some(600);
        spec.dropout = Some(0.05);
        spec.minor_af = Some(0.01);
        let (result, _) = parse_one(spec);
        let db = result.unwrap();
        let locus = &db.loci[0];
        assert_eq!(locus.database_size, Some(600));
        assert_eq!(locus.dropout, Some(0.05));
        assert_eq!(locus.minor_af, Some(0.01));
    }

    #[test]
    fn test_zero_allele_is_renamed() {
        let spec = LocusSpec::equal("SE33", &[("0", 0.1), ("17", 0.9)], 0.001);
        let (result, report) = parse_one(spec);
        let db = result.unwrap();
        let locus = &db.loci[0];
        assert_eq!(locus.allele_label(1), Some("z"));
        assert!(locus.alleles.keys().all(|l| l != "0"));
        assert!(!report.is_empty());
    }

    #[test]
    fn test_stepwise_fallback_on_non_numeric_allele() {
        let mut spec = LocusSpec::equal("Amel", &[("X", 0.5), ("Y", 0.5)], 0.001);
        spec.female_code = 2;
        spec.male_code = 2;
        let (result, report) = parse_one(spec);
        let db = result.unwrap();
        let locus = &db.loci[0];
        // Both sexes fall back together.
        assert_eq!(locus.female_model.kind, ModelKind::Equal);
        assert_eq!(locus.male_model.kind, ModelKind::Equal);
        assert!(report.entries()[0].contains("'X'"));
    }

    #[test]
    fn test_stepwise_fallback_on_microvariant_rule() {
        let mut spec = LocusSpec::equal("FGA", &[("9.33", 0.5), ("10", 0.5)], 0.001);
        spec.male_code = 2;
        let (result, report) = parse_one(spec);
        let db = result.unwrap();
        let locus = &db.loci[0];
        assert_eq!(locus.male_model.kind, ModelKind::Equal);
        assert_eq!(locus.female_model.kind, ModelKind::Equal);
        assert!(report.entries()[0].contains("decimal place"));
    }

    #[test]
    fn test_stepwise_kept_for_compatible_alleles() {
        let mut spec = LocusSpec::equal("D3S1358", &[("14", 0.3), ("15", 0.3), ("16", 0.4)], 0.001);
        spec.female_code = 2;
        spec.male_code = 2;
        spec.range = 0.5;
        let (result, report) = parse_one(spec);
        let db = result.unwrap();
        let locus = &db.loci[0];
        assert_eq!(locus.female_model.kind, ModelKind::Stepwise);
        assert!(report.is_empty());
    }

    #[test]
    fn test_stationary_stepwise_is_stabilized() {
        let mut spec = LocusSpec::equal("D21S11", &[("28", 0.5), ("29", 0.5)], 0.01);
        spec.female_code = 3;
        spec.male_code = 2;
        spec.range = 0.5;
        let (result, _) = parse_one(spec);
        let db = result.unwrap();
        let locus = &db.loci[0];
        assert!(locus.female_model.stationary);
        assert!(locus
            .female_model
            .matrix
            .is_stationary(&locus.frequencies(), 1e-6));
        assert!(!locus.male_model.stationary);
    }

    #[test]
    fn test_silent_frequency_flag_is_unsupported() {
        let mut spec = LocusSpec::equal("PentaE", &[("5", 1.0)], 0.001);
        spec.silent_frequency = Some(0.01);
        let (result, _) = parse_one(spec);
        assert!(matches!(
            result,
            Err(FamError::UnsupportedFeature("silent allele frequencies"))
        ));
    }

    #[test]
    fn test_model_code_above_four_rejected() {
        let mut spec = LocusSpec::equal("bad", &[("1", 1.0)], 0.001);
        spec.female_code = 5;
        let (result, _) = parse_one(spec);
        assert!(matches!(result, Err(FamError::FormatError { .. })));
    }

    #[test]
    fn test_two_locus_stride() {
        let mut lines = vec!["db".to_string(), "2".to_string()];
        lines.extend(locus_block(&LocusSpec::equal(
            "L1",
            &[("1", 0.5), ("2", 0.5)],
            0.001,
        )));
        lines.extend(locus_block(&LocusSpec::equal("L2", &[("3", 1.0)], 0.001)));
        let stream = LineStream::new(lines);
        let mut cursor = stream.cursor();
        let mut report = Report::new();
        let db = parse_marker_database(&mut cursor, &mut report, FallbackModel::Equal, false)
            .unwrap();
        assert_eq!(db.loci.len(), 2);
        assert_eq!(db.loci[1].name, "L2");
        assert!(cursor.peek(0).is_none());
    }
}
