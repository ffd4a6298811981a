//! Parser for the main (pedigree) section of a `.fam` file.
//!
//! This is a strictly sequential state machine over the line stream: the
//! stride from one individual record to the next is `6 + 3*nmi` lines,
//! where `nmi` is that individual's genotype count, so no line is
//! addressable without replaying all prior strides. There is no
//! backtracking and no partial result; any structural mismatch aborts.

use indexmap::IndexMap;

use crate::cursor::{extract_labeled_number, is_true_flag, parse_optional_number, LineCursor};
use crate::error::FamError;
use crate::pedigree::{AlleleIndexTable, FamPedigree, IndexedGenotype, PedigreeSet, Sex};
use crate::reporting::Report;

/// The literal header opening the relations block.
const KNOWN_RELATIONS: &str = "Known relations";

/// Everything recovered from the main section.
#[derive(Clone, Debug)]
pub struct MainSection {
    pub version: String,
    pub pedigrees: PedigreeSet,
    pub genotypes: AlleleIndexTable,
    /// Per-individual "consider dropout" flags, in file order.
    pub dropout_flags: IndexMap<String, bool>,
    pub theta: Option<f64>,
}

/// Parse the main section, leaving the cursor on the first line of the
/// marker database section.
///
/// `params_requested` suppresses the nonzero-theta diagnostic: the value is
/// only kept when the caller asked for the parameter bundle, and silently
/// dropping a nonzero correction otherwise would hide information.
pub fn parse_main_section(
    cursor: &mut LineCursor,
    report: &mut Report,
    params_requested: bool,
) -> Result<MainSection, FamError> {
    let version = cursor.line_at(2, "the format version")?.to_string();

    // The individual count sits on line 4 when that line is non-empty and
    // on line 5 otherwise. Observed Familias behavior, preserved as-is.
    let nid;
    if cursor.peek(3).is_some_and(|l| !l.trim().is_empty()) {
        nid = cursor.read_count(3, "the number of individuals")?;
        cursor.advance(4);
    } else {
        nid = cursor.read_count(4, "the number of individuals")?;
        cursor.advance(5);
    }

    let mut base = FamPedigree::new();
    let mut genotypes = AlleleIndexTable::new();
    let mut dropout_flags = IndexMap::new();

    for _ in 0..nid {
        let id = cursor.line_at(0, "an individual id")?.to_string();
        let dropout = is_true_flag(cursor.line_at(2, "a dropout flag")?);
        let sex = if is_true_flag(cursor.line_at(4, "a sex flag")?) {
            Sex::Male
        } else {
            Sex::Female
        };
        let nmi = cursor.read_count(5, "the genotype count")?;

        base.push_individual(id.clone(), sex);
        dropout_flags.insert(id.clone(), dropout);

        for m in 0..nmi {
            let offset = 6 + 3 * m;
            let line = cursor.position() + offset;
            // The file stores allele and marker indices 0-based.
            let allele1 = cursor.read_count(offset, "an allele index")? + 1;
            let allele2 = cursor.read_count(offset + 1, "an allele index")? + 1;
            let marker = cursor.read_count(offset + 2, "a marker index")? + 1;
            genotypes.push(
                &id,
                IndexedGenotype {
                    allele1,
                    allele2,
                    marker,
                    line,
                },
            );
        }
        cursor.advance(6 + 3 * nmi);
    }

    cursor.expect_literal(KNOWN_RELATIONS)?;
    read_extras(cursor, &mut base)?;
    let n_relations = cursor.next_count("the number of known relations")?;
    for _ in 0..n_relations {
        let parent = cursor.next_count("a parent index")? + 1;
        let child = cursor.next_count("a child index")? + 1;
        base.assign_parent(parent, child)?;
    }

    let n_ped = cursor.next_count("the number of pedigrees")?;
    let pedigrees = if n_ped == 0 {
        base.validate()?;
        PedigreeSet::Single(base)
    } else {
        let mut named = IndexMap::new();
        for _ in 0..n_ped {
            let _index = cursor.next_int("a pedigree index")?;
            let name = cursor.next_str("a pedigree name")?.to_string();
            let ped = parse_pedigree_block(cursor, &base)?;
            ped.validate()?;
            named.insert(name, ped);
        }
        PedigreeSet::Many(named)
    };

    if is_true_flag(cursor.line_at(0, "the precomputed-probabilities flag")?) {
        return Err(FamError::UnsupportedFeature(
            "precomputed probability tables",
        ));
    }
    cursor.advance(1);

    let theta = read_theta(cursor);
    cursor.advance(1);
    if let Some(t) = theta {
        if t != 0.0 && !params_requested {
            report.add_issue(format!(
                "nonzero theta correction ({t}) present but not requested; \
                 pass include_params to receive it"
            ));
        }
    }

    Ok(MainSection {
        version,
        pedigrees,
        genotypes,
        dropout_flags,
        theta,
    })
}

/// Read the extra-female and extra-male counts and append synthesized
/// `extra_<k>` individuals, females first. Numbering continues across any
/// extras the pedigree already holds.
fn read_extras(cursor: &mut LineCursor, ped: &mut FamPedigree) -> Result<(), FamError> {
    let n_female = cursor.next_count("the number of extra females")?;
    let n_male = cursor.next_count("the number of extra males")?;
    let offset = ped.ids.iter().filter(|id| id.starts_with("extra_")).count();
    for k in 0..n_female {
        ped.push_individual(format!("extra_{}", offset + k + 1), Sex::Female);
    }
    for k in 0..n_male {
        ped.push_individual(format!("extra_{}", offset + n_female + k + 1), Sex::Male);
    }
    Ok(())
}

/// One per-pedigree block: scoped extra individuals plus a relation list,
/// extending a copy of the base arrays.
fn parse_pedigree_block(
    cursor: &mut LineCursor,
    base: &FamPedigree,
) -> Result<FamPedigree, FamError> {
    let mut ped = base.clone();
    read_extras(cursor, &mut ped)?;
    let n_relations = cursor.next_count("the number of pedigree relations")?;
    for _ in 0..n_relations {
        let parent_text = cursor.line_at(0, "a parent index")?;
        let parent = match parent_text.trim().parse::<usize>() {
            Ok(p) => p + 1,
            // The twin encoding has no dedicated marker; it only surfaces
            // as a non-integer parent field. Probe for it before reporting
            // a plain format error.
            Err(_) if parent_text.to_ascii_lowercase().contains("twin") => {
                return Err(FamError::UnsupportedFeature("twin relations"));
            }
            Err(_) => {
                return Err(FamError::format(
                    cursor.position(),
                    "a parent index",
                    parent_text,
                ));
            }
        };
        cursor.advance(1);
        let child = cursor.next_count("a child index")? + 1;
        ped.assign_parent(parent, child)?;
    }
    Ok(ped)
}

/// Theta/kinship/Fst from the free-text line under the cursor: a labeled
/// field when one is present, otherwise plain numeric coercion of the
/// whole line. Absence is not an error.
fn read_theta(cursor: &LineCursor) -> Option<f64> {
    let line = cursor.peek(0)?;
    for label in ["Theta", "Kinship", "Fst"] {
        if let Some(value) = extract_labeled_number(line, label) {
            return Some(value);
        }
    }
    parse_optional_number(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::LineStream;
    use crate::test_utilities::{fam_header, individual_record, known_relations, tail_section};

    fn parse(lines: Vec<String>) -> Result<MainSection, FamError> {
        let stream = LineStream::new(lines);
        let mut cursor = stream.cursor();
        let mut report = Report::new();
        parse_main_section(&mut cursor, &mut report, false)
    }

    #[test]
    fn test_minimal_file_counts() {
        let mut lines = fam_header(3);
        lines.extend(individual_record("MO", false, Sex::Female, &[(1, 2, 1)]));
        lines.extend(individual_record("CH", false, Sex::Female, &[(1, 1, 1)]));
        lines.extend(individual_record("AF", true, Sex::Male, &[(2, 2, 1)]));
        lines.extend(known_relations(0, 0, &[(0, 1)]));
        lines.extend(tail_section(0.0));

        let main = parse(lines).unwrap();
        match &main.pedigrees {
            PedigreeSet::Single(ped) => {
                assert_eq!(ped.len(), 3);
                assert_eq!(ped.sex, vec![Sex::Female, Sex::Female, Sex::Male]);
                // MO (index 1) is the recorded mother of CH.
                assert_eq!(ped.mother_index, vec![0, 1, 0]);
            }
            other => panic!("expected a single pedigree, got {other:?}"),
        }
        assert_eq!(main.genotypes.rows.len(), 3);
        assert_eq!(main.dropout_flags["AF"], true);
        assert_eq!(main.dropout_flags["MO"], false);
        assert_eq!(main.version, "Familias 3");
    }

    #[test]
    fn test_genotype_indices_are_shifted() {
        let mut lines = fam_header(1);
        lines.extend(individual_record("A", false, Sex::Male, &[(0, 1, 0)]));
        lines.extend(known_relations(0, 0, &[]));
        lines.extend(tail_section(0.0));

        let main = parse(lines).unwrap();
        let g = main.genotypes.rows["A"][0];
        assert_eq!((g.allele1, g.allele2, g.marker), (1, 2, 1));
    }

    #[test]
    fn test_nid_falls_back_to_line_five() {
        let mut lines: Vec<String> = vec![
            "Output from Familias".into(),
            "(Internal data structures)".into(),
            "Familias 3".into(),
            "".into(),
            "1".into(),
        ];
        lines.extend(individual_record("A", false, Sex::Male, &[]));
        lines.extend(known_relations(0, 0, &[]));
        lines.extend(tail_section(0.0));

        let main = parse(lines).unwrap();
        match main.pedigrees {
            PedigreeSet::Single(ped) => assert_eq!(ped.ids, vec!["A"]),
            other => panic!("expected single pedigree, got {other:?}"),
        }
    }

    #[test]
    fn test_extra_individuals_are_synthesized() {
        let mut lines = fam_header(1);
        lines.extend(individual_record("CH", false, Sex::Female, &[]));
        // One extra female, one extra male, both parents of CH.
        lines.extend(known_relations(1, 1, &[(1, 0), (2, 0)]));
        lines.extend(tail_section(0.0));

        let main = parse(lines).unwrap();
        match main.pedigrees {
            PedigreeSet::Single(ped) => {
                assert_eq!(ped.ids, vec!["CH", "extra_1", "extra_2"]);
                assert_eq!(ped.sex, vec![Sex::Female, Sex::Female, Sex::Male]);
                assert_eq!(ped.mother_index[0], 2);
                assert_eq!(ped.father_index[0], 3);
            }
            other => panic!("expected single pedigree, got {other:?}"),
        }
    }

    #[test]
    fn test_named_pedigree_blocks() {
        let mut lines = fam_header(2);
        lines.extend(individual_record("CH", false, Sex::Female, &[]));
        lines.extend(individual_record("AF", false, Sex::Male, &[]));
        lines.extend(known_relations(0, 0, &[]));
        // Two pedigrees: paternity (AF is father of CH) and unrelated.
        lines.pop(); // drop the zero pedigree count from known_relations
        lines.push("2".into());
        lines.extend(["1".into(), "Paternity".into()]);
        lines.extend(["0".into(), "0".into(), "1".into(), "1".into(), "0".into()]);
        lines.extend(["2".into(), "Unrelated".into()]);
        lines.extend(["0".into(), "0".into(), "0".into()]);
        lines.extend(tail_section(0.0));

        let main = parse(lines).unwrap();
        match &main.pedigrees {
            PedigreeSet::Many(m) => {
                assert_eq!(m.len(), 2);
                assert_eq!(m["Paternity"].father_index, vec![2, 0]);
                assert_eq!(m["Unrelated"].father_index, vec![0, 0]);
            }
            other => panic!("expected named pedigrees, got {other:?}"),
        }
    }

    #[test]
    fn test_twin_relation_is_unsupported() {
        let mut lines = fam_header(2);
        lines.extend(individual_record("A", false, Sex::Male, &[]));
        lines.extend(individual_record("B", false, Sex::Male, &[]));
        lines.extend(known_relations(0, 0, &[]));
        lines.pop();
        lines.push("1".into());
        lines.extend(["1".into(), "Twins".into()]);
        lines.extend(["0".into(), "0".into(), "1".into()]);
        lines.extend(["Twin group 1".into(), "1".into()]);
        lines.extend(tail_section(0.0));

        assert!(matches!(
            parse(lines),
            Err(FamError::UnsupportedFeature("twin relations"))
        ));
    }

    #[test]
    fn test_precomputed_probabilities_are_unsupported() {
        let mut lines = fam_header(1);
        lines.extend(individual_record("A", false, Sex::Male, &[]));
        lines.extend(known_relations(0, 0, &[]));
        lines.push("#TRUE#".into());
        lines.push("0".into());

        assert!(matches!(
            parse(lines),
            Err(FamError::UnsupportedFeature(
                "precomputed probability tables"
            ))
        ));
    }

    #[test]
    fn test_nonzero_theta_warns_when_not_requested() {
        let mut lines = fam_header(1);
        lines.extend(individual_record("A", false, Sex::Male, &[]));
        lines.extend(known_relations(0, 0, &[]));
        lines.extend(tail_section(0.02));

        let stream = LineStream::new(lines);
        let mut cursor = stream.cursor();
        let mut report = Report::new();
        let main = parse_main_section(&mut cursor, &mut report, false).unwrap();
        assert_eq!(main.theta, Some(0.02));
        assert!(!report.is_empty());

        // Requested: kept quietly.
        let mut cursor = stream.cursor();
        let mut report = Report::new();
        let main = parse_main_section(&mut cursor, &mut report, true).unwrap();
        assert_eq!(main.theta, Some(0.02));
        assert!(report.is_empty());
    }

    #[test]
    fn test_bad_relations_header_aborts() {
        let mut lines = fam_header(1);
        lines.extend(individual_record("A", false, Sex::Male, &[]));
        lines.push("Relations".into());

        assert!(matches!(parse(lines), Err(FamError::FormatError { .. })));
    }
}
