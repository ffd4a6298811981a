//! Interpretation of the DVI bracket tree.
//!
//! The tree parser gives structure; this module gives it meaning. Two
//! subtrees are interpreted: `Unidentified persons` (a flat person list
//! with genotypes and no relations) and `Reference families` (per family,
//! a person list plus one or more named pedigree variants encoded as
//! parent/child pairs). Parent sexes that the file leaves unknown are
//! inferred from co-parent evidence; the inference is deliberately shallow
//! (one pass plus one retry) so a genuinely ambiguous file fails loudly
//! instead of converging to an arbitrary assignment.

use indexmap::IndexMap;

use super::tree::DviNode;
use crate::error::FamError;
use crate::pedigree::{FamPedigree, GenotypeTable, PedigreeSet, Sex};

const UNIDENTIFIED: &str = "Unidentified persons";
const FAMILIES: &str = "Reference families";
const REFERENCE_PEDIGREE: &str = "Reference pedigree";

/// The unidentified-persons block: a relation-free pedigree plus the
/// stacked genotype matrix of all persons.
#[derive(Clone, Debug, PartialEq)]
pub struct DviUnidentified {
    pub pedigree: FamPedigree,
    pub datamatrix: GenotypeTable,
}

/// One reference family: named pedigree variants sharing a genotype matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct DviFamily {
    pub name: String,
    pub pedigrees: PedigreeSet,
    pub datamatrix: GenotypeTable,
}

/// Everything recovered from the DVI section.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DviData {
    pub families: IndexMap<String, DviFamily>,
    pub unidentified: Option<DviUnidentified>,
}

impl DviData {
    pub fn is_empty(&self) -> bool {
        self.families.is_empty() && self.unidentified.is_none()
    }
}

/// One person record extracted from a person node.
#[derive(Clone, Debug)]
struct DviPerson {
    id: String,
    sex: Sex,
    /// `(locus, allele1, allele2)` triples from the `DNA data` child.
    genotypes: Vec<(String, String, String)>,
}

/// Interpret the whole DVI tree.
pub fn interpret_dvi(root: &DviNode, dedup: bool) -> Result<DviData, FamError> {
    let unidentified = root
        .child(UNIDENTIFIED)
        .map(interpret_unidentified)
        .transpose()?;

    let mut families = IndexMap::new();
    if let Some(node) = root.child(FAMILIES) {
        let declared = node
            .value("Number of families")
            .ok_or_else(|| {
                FamError::DviStructure(format!("'{FAMILIES}' lacks a 'Number of families' entry"))
            })?
            .parse::<usize>()
            .map_err(|_| {
                FamError::DviStructure("'Number of families' is not an integer".to_string())
            })?;
        if declared != node.children.len() {
            return Err(FamError::CountMismatch {
                item_type: "reference families",
                declared,
                found: node.children.len(),
            });
        }
        for family_node in node.children.values() {
            let family = interpret_family(family_node, dedup)?;
            families.insert(family.name.clone(), family);
        }
    }

    Ok(DviData {
        families,
        unidentified,
    })
}

fn interpret_unidentified(node: &DviNode) -> Result<DviUnidentified, FamError> {
    let persons = extract_persons(node)?;
    let mut pedigree = FamPedigree::new();
    for person in &persons {
        pedigree.push_individual(&person.id, person.sex);
    }
    let datamatrix = build_genotype_table(&persons);
    Ok(DviUnidentified {
        pedigree,
        datamatrix,
    })
}

fn interpret_family(node: &DviNode, dedup: bool) -> Result<DviFamily, FamError> {
    let persons_node = node.child("Persons").ok_or_else(|| {
        FamError::DviStructure(format!("family '{}' has no 'Persons' node", node.name))
    })?;
    let persons = extract_persons(persons_node)?;
    let datamatrix = build_genotype_table(&persons);

    let pedigrees_node = node.child("Pedigrees").ok_or_else(|| {
        FamError::DviStructure(format!("family '{}' has no 'Pedigrees' node", node.name))
    })?;

    let mut variants: IndexMap<String, FamPedigree> = IndexMap::new();
    for variant in pedigrees_node.children.values() {
        let pairs = extract_relation_pairs(variant)?;
        let ped = build_variant_pedigree(&persons, &pairs)?;
        variants.insert(variant.name.clone(), ped);
    }

    // Two byte-identical encodings of the same pedigree, one under the
    // stock name, collapse to the informatively named one.
    let pedigrees = if dedup && variants.len() == 2 && variants.contains_key(REFERENCE_PEDIGREE) {
        let nodes: Vec<&DviNode> = pedigrees_node.children.values().collect();
        if nodes[0].data == nodes[1].data {
            let (kept_name, kept) = variants
                .into_iter()
                .find(|(name, _)| name != REFERENCE_PEDIGREE)
                .expect("two variants, one of them the reference");
            let mut single = IndexMap::new();
            single.insert(kept_name, kept);
            PedigreeSet::Many(single).simplify()
        } else {
            PedigreeSet::Many(variants)
        }
    } else {
        PedigreeSet::Many(variants)
    };

    Ok(DviFamily {
        name: node.name.clone(),
        pedigrees,
        datamatrix,
    })
}

/// Extract the person children of `node`, in order.
fn extract_persons(node: &DviNode) -> Result<Vec<DviPerson>, FamError> {
    let mut persons = Vec::with_capacity(node.children.len());
    for child in node.children.values() {
        let id = child
            .value("Name")
            .ok_or_else(|| {
                FamError::DviStructure(format!("person node '{}' has no 'Name' entry", child.name))
            })?
            .to_string();
        let sex = match child.value("Gender") {
            Some("Male") => Sex::Male,
            Some("Female") => Sex::Female,
            _ => Sex::Unknown,
        };
        let genotypes = child
            .child("DNA data")
            .map(extract_dna_data)
            .transpose()?
            .unwrap_or_default();
        persons.push(DviPerson { id, sex, genotypes });
    }
    Ok(persons)
}

/// Flatten the repeating `SystemName` / `Allele 1` / `Allele 2` triples of
/// a `DNA data` node.
fn extract_dna_data(node: &DviNode) -> Result<Vec<(String, String, String)>, FamError> {
    let mut triples = Vec::new();
    let mut current: Option<(String, Option<String>, Option<String>)> = None;
    for (tag, value) in &node.data {
        match tag.as_str() {
            "SystemName" => {
                flush_triple(&mut current, &mut triples)?;
                current = Some((value.clone(), None, None));
            }
            "Allele 1" => match current.as_mut() {
                Some((_, a1 @ None, _)) => *a1 = Some(value.clone()),
                _ => {
                    return Err(FamError::DviStructure(format!(
                        "'Allele 1 = {value}' outside a SystemName group"
                    )))
                }
            },
            "Allele 2" => match current.as_mut() {
                Some((_, Some(_), a2 @ None)) => *a2 = Some(value.clone()),
                _ => {
                    return Err(FamError::DviStructure(format!(
                        "'Allele 2 = {value}' outside a SystemName group"
                    )))
                }
            },
            other => {
                return Err(FamError::DviStructure(format!(
                    "unexpected tag '{other}' in a DNA data node"
                )))
            }
        }
    }
    flush_triple(&mut current, &mut triples)?;
    Ok(triples)
}

fn flush_triple(
    current: &mut Option<(String, Option<String>, Option<String>)>,
    triples: &mut Vec<(String, String, String)>,
) -> Result<(), FamError> {
    if let Some((locus, a1, a2)) = current.take() {
        match (a1, a2) {
            (Some(a1), Some(a2)) => triples.push((locus, a1, a2)),
            _ => {
                return Err(FamError::DviStructure(format!(
                    "incomplete allele pair for locus '{locus}'"
                )))
            }
        }
    }
    Ok(())
}

/// Collect the consecutive `Parent` / `Child` pairs of a pedigree variant.
fn extract_relation_pairs(node: &DviNode) -> Result<Vec<(String, String)>, FamError> {
    let mut pairs = Vec::new();
    let mut pending_parent: Option<String> = None;
    for (tag, value) in &node.data {
        match (tag.as_str(), pending_parent.take()) {
            ("Parent", None) => pending_parent = Some(value.clone()),
            ("Child", Some(parent)) => pairs.push((parent, value.clone())),
            _ => {
                return Err(FamError::DviStructure(format!(
                    "pedigree '{}' has a dangling '{tag}' entry",
                    node.name
                )))
            }
        }
    }
    if pending_parent.is_some() {
        return Err(FamError::DviStructure(format!(
            "pedigree '{}' ends with an unmatched 'Parent' entry",
            node.name
        )));
    }
    Ok(pairs)
}

/// Build one pedigree variant from the person list plus its relation pairs.
///
/// Ids referenced only in pairs are appended as extra individuals of
/// unknown sex, then unknown-sex parents are resolved from co-parent
/// evidence before the father/mother arrays are assigned.
fn build_variant_pedigree(
    persons: &[DviPerson],
    pairs: &[(String, String)],
) -> Result<FamPedigree, FamError> {
    let mut ped = FamPedigree::new();
    for person in persons {
        ped.push_individual(&person.id, person.sex);
    }
    for (parent, child) in pairs {
        for id in [parent, child] {
            if ped.index_of(id).is_none() {
                ped.push_individual(id, Sex::Unknown);
            }
        }
    }

    resolve_parent_sexes(&mut ped, pairs)?;

    for (parent, child) in pairs {
        let pi = ped.index_of(parent).expect("parent id was inserted");
        let ci = ped.index_of(child).expect("child id was inserted");
        let slot_taken = match ped.sex[pi - 1] {
            Sex::Male => ped.father_index[ci - 1] != 0,
            Sex::Female => ped.mother_index[ci - 1] != 0,
            Sex::Unknown => false,
        };
        if slot_taken {
            return Err(FamError::DviStructure(format!(
                "'{child}' has two recorded parents of the same sex"
            )));
        }
        ped.assign_parent(pi, ci)?;
    }
    ped.validate()?;
    Ok(ped)
}

/// Resolve the sex of each unknown-sex parent from its co-parents: when
/// every co-parent of known sex agrees, the parent takes the opposite sex.
/// One retry pass lets a resolution feed the next; anything still unknown
/// after that, or any disagreement among co-parents, is a fatal ambiguity.
fn resolve_parent_sexes(ped: &mut FamPedigree, pairs: &[(String, String)]) -> Result<(), FamError> {
    let unknown_parents: Vec<String> = pairs
        .iter()
        .map(|(p, _)| p.clone())
        .filter(|p| {
            ped.index_of(p)
                .is_some_and(|i| ped.sex[i - 1] == Sex::Unknown)
        })
        .collect();
    if unknown_parents.is_empty() {
        return Ok(());
    }

    let mut remaining = unknown_parents;
    remaining.dedup();
    for pass in 0..2 {
        let final_pass = pass == 1;
        let mut unresolved = Vec::new();
        for parent in remaining {
            match co_parent_sex(ped, pairs, &parent)? {
                Some(sex) => {
                    let i = ped.index_of(&parent).expect("parent id is present");
                    ped.sex[i - 1] = sex.opposite();
                }
                None if final_pass => {
                    return Err(FamError::AmbiguousParentSex(parent));
                }
                None => unresolved.push(parent),
            }
        }
        if unresolved.is_empty() {
            return Ok(());
        }
        remaining = unresolved;
    }
    Ok(())
}

/// The unanimous known sex among `parent`'s co-parents, `None` when all
/// co-parents are unknown (or there are none), and an error when known
/// co-parents disagree.
fn co_parent_sex(
    ped: &FamPedigree,
    pairs: &[(String, String)],
    parent: &str,
) -> Result<Option<Sex>, FamError> {
    let children: Vec<&str> = pairs
        .iter()
        .filter(|(p, _)| p == parent)
        .map(|(_, c)| c.as_str())
        .collect();
    let mut seen: Option<Sex> = None;
    for (p, c) in pairs {
        if p == parent || !children.contains(&c.as_str()) {
            continue;
        }
        let i = ped.index_of(p).expect("parent id is present");
        match (ped.sex[i - 1], seen) {
            (Sex::Unknown, _) => {}
            (sex, None) => seen = Some(sex),
            (sex, Some(prior)) if sex != prior => {
                return Err(FamError::AmbiguousParentSex(parent.to_string()));
            }
            _ => {}
        }
    }
    Ok(seen)
}

/// Stack person genotype vectors into one matrix over the union of the
/// locus labels seen, in first-seen order; gaps stay untyped.
fn build_genotype_table(persons: &[DviPerson]) -> GenotypeTable {
    let mut loci: Vec<String> = Vec::new();
    for person in persons {
        for (locus, _, _) in &person.genotypes {
            if !loci.contains(locus) {
                loci.push(locus.clone());
            }
        }
    }
    let mut table = GenotypeTable::new(loci);
    for person in persons {
        table.insert_row(&person.id);
        for (locus, a1, a2) in &person.genotypes {
            let col = table
                .loci
                .iter()
                .position(|l| l == locus)
                .expect("locus was unioned");
            table.set(&person.id, col, (a1.clone(), a2.clone()));
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::LineStream;
    use crate::parsers::dvi::tree::parse_dvi_tree;

    fn interpret(lines: &[&str], dedup: bool) -> Result<DviData, FamError> {
        let stream: LineStream = lines.iter().copied().collect();
        let tree = parse_dvi_tree(&stream, 1).unwrap();
        interpret_dvi(&tree, dedup)
    }

    fn person_lines(depth: usize, id: &str, gender: &str, dna: &[(&str, &str, &str)]) -> Vec<String> {
        let open = "[".repeat(depth);
        let close = "]".repeat(depth);
        let mut lines = vec![
            format!("{open}{id}{close}"),
            format!("Name = {id}"),
            format!("Gender = {gender}"),
        ];
        if !dna.is_empty() {
            let open = "[".repeat(depth + 1);
            let close = "]".repeat(depth + 1);
            lines.push(format!("{open}DNA data{close}"));
            for (locus, a1, a2) in dna {
                lines.push(format!("SystemName = {locus}"));
                lines.push(format!("Allele 1 = {a1}"));
                lines.push(format!("Allele 2 = {a2}"));
            }
        }
        lines
    }

    #[test]
    fn test_unidentified_persons() {
        let mut lines = vec!["[DVI]".to_string(), "[[Unidentified persons]]".to_string()];
        lines.extend(person_lines(3, "PM1", "Male", &[("VWA", "14", "15")]));
        lines.extend(person_lines(3, "PM2", "Other", &[("TH01", "6", "7")]));
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();

        let data = interpret(&refs, true).unwrap();
        let un = data.unidentified.unwrap();
        assert_eq!(un.pedigree.ids, vec!["PM1", "PM2"]);
        assert_eq!(un.pedigree.sex, vec![Sex::Male, Sex::Unknown]);
        assert_eq!(un.pedigree.father_index, vec![0, 0]);

        // Locus label sets are unioned; gaps stay untyped.
        assert_eq!(un.datamatrix.loci, vec!["VWA", "TH01"]);
        assert_eq!(un.datamatrix.get("PM1", "VWA"), Some(&("14".into(), "15".into())));
        assert_eq!(un.datamatrix.get("PM1", "TH01"), None);
        assert_eq!(un.datamatrix.get("PM2", "TH01"), Some(&("6".into(), "7".into())));
    }

    fn family_lines(variants: &[(&str, &[(&str, &str)])]) -> Vec<String> {
        let mut lines = vec![
            "[DVI]".to_string(),
            "[[Reference families]]".to_string(),
            "Number of families = 1".to_string(),
            "[[[F1]]]".to_string(),
            "[[[[Persons]]]]".to_string(),
        ];
        lines.extend(person_lines(5, "FA", "Male", &[("VWA", "14", "14")]));
        lines.extend(person_lines(5, "MO", "Female", &[("VWA", "15", "16")]));
        lines.extend(person_lines(5, "MP", "Male", &[]));
        lines.push("[[[[Pedigrees]]]]".to_string());
        for (name, pairs) in variants {
            lines.push(format!("[[[[[{name}]]]]]"));
            for (parent, child) in *pairs {
                lines.push(format!("Parent = {parent}"));
                lines.push(format!("Child = {child}"));
            }
        }
        lines
    }

    #[test]
    fn test_reference_family() {
        let pairs: &[(&str, &str)] = &[("FA", "MP"), ("MO", "MP")];
        let lines = family_lines(&[("Family tree", pairs)]);
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();

        let data = interpret(&refs, true).unwrap();
        assert_eq!(data.families.len(), 1);
        let family = &data.families["F1"];
        match &family.pedigrees {
            PedigreeSet::Many(m) => {
                let ped = &m["Family tree"];
                assert_eq!(ped.ids, vec!["FA", "MO", "MP"]);
                assert_eq!(ped.father_index, vec![0, 0, 1]);
                assert_eq!(ped.mother_index, vec![0, 0, 2]);
            }
            other => panic!("expected named variants, got {other:?}"),
        }
        assert_eq!(
            family.datamatrix.get("FA", "VWA"),
            Some(&("14".into(), "14".into()))
        );
    }

    #[test]
    fn test_unlisted_id_becomes_unknown_extra_and_is_inferred() {
        // GM is never declared as a person; as FA's co-parent (male), she
        // resolves to female.
        let pairs: &[(&str, &str)] = &[("FA", "MP"), ("GM", "MP")];
        let lines = family_lines(&[("Ped", pairs)]);
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();

        let data = interpret(&refs, true).unwrap();
        let family = &data.families["F1"];
        match &family.pedigrees {
            PedigreeSet::Many(m) => {
                let ped = &m["Ped"];
                let gm = ped.index_of("GM").unwrap();
                assert_eq!(ped.sex[gm - 1], Sex::Female);
                assert_eq!(ped.mother_index[ped.index_of("MP").unwrap() - 1], gm);
            }
            other => panic!("expected named variants, got {other:?}"),
        }
    }

    #[test]
    fn test_lone_unknown_parent_is_ambiguous() {
        let pairs: &[(&str, &str)] = &[("X", "MP")];
        let lines = family_lines(&[("Ped", pairs)]);
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();

        assert!(matches!(
            interpret(&refs, true),
            Err(FamError::AmbiguousParentSex(id)) if id == "X"
        ));
    }

    #[test]
    fn test_chained_inference_needs_only_one_retry() {
        // Y's co-parent X starts unknown; once X resolves against FA's
        // known sex (via MP), the retry pass resolves Y against X.
        let pairs: &[(&str, &str)] = &[
            ("FA", "MP"),
            ("X", "MP"),
            ("X", "C2"),
            ("Y", "C2"),
        ];
        let lines = family_lines(&[("Ped", pairs)]);
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();

        let data = interpret(&refs, true).unwrap();
        let family = &data.families["F1"];
        match &family.pedigrees {
            PedigreeSet::Many(m) => {
                let ped = &m["Ped"];
                assert_eq!(ped.sex[ped.index_of("X").unwrap() - 1], Sex::Female);
                assert_eq!(ped.sex[ped.index_of("Y").unwrap() - 1], Sex::Male);
            }
            other => panic!("expected named variants, got {other:?}"),
        }
    }

    #[test]
    fn test_dedup_drops_reference_pedigree() {
        let pairs: &[(&str, &str)] = &[("FA", "MP"), ("MO", "MP")];
        let lines = family_lines(&[("Reference pedigree", pairs), ("Family tree", pairs)]);
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();

        let data = interpret(&refs, true).unwrap();
        let family = &data.families["F1"];
        assert!(matches!(family.pedigrees, PedigreeSet::Single(_)));

        // With dedup disabled, both variants survive.
        let data = interpret(&refs, false).unwrap();
        let family = &data.families["F1"];
        assert_eq!(family.pedigrees.len(), 2);
    }

    #[test]
    fn test_dedup_requires_identical_content() {
        let pairs_a: &[(&str, &str)] = &[("FA", "MP"), ("MO", "MP")];
        let pairs_b: &[(&str, &str)] = &[("FA", "MP")];
        let lines = family_lines(&[("Reference pedigree", pairs_a), ("Family tree", pairs_b)]);
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();

        let data = interpret(&refs, true).unwrap();
        assert_eq!(data.families["F1"].pedigrees.len(), 2);
    }

    #[test]
    fn test_family_count_mismatch() {
        let mut lines = family_lines(&[("Ped", &[("FA", "MP")])]);
        let idx = lines
            .iter()
            .position(|l| l.starts_with("Number of families"))
            .unwrap();
        lines[idx] = "Number of families = 2".to_string();
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();

        assert!(matches!(
            interpret(&refs, true),
            Err(FamError::CountMismatch {
                item_type: "reference families",
                declared: 2,
                found: 1,
            })
        ));
    }
}
