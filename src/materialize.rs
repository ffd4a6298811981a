//! Conversion of parsed pedigrees into the consumer-facing family-tree
//! representation.
//!
//! The index model recovered from a `.fam` file allows individuals with a
//! single recorded parent; downstream pedigree consumers expect every
//! non-founder to have exactly two. The materializer inserts the missing
//! parent as a synthesized founder named `<prefix>_<n>`, carrying no
//! genotypes.

use serde::{Deserialize, Serialize};

use crate::parsers::markers::Locus;
use crate::pedigree::{FamPedigree, GenotypePair, GenotypeTable, PedigreeSet, Sex};

/// One row of a materialized family tree.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FamilyMember {
    pub id: String,
    pub father: Option<String>,
    pub mother: Option<String>,
    pub sex: Sex,
    /// One slot per locus, aligned with [`FamilyTree::loci`].
    pub genotypes: Vec<Option<GenotypePair>>,
}

/// A materialized family tree: member rows plus the locus names their
/// genotype slots are aligned with.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FamilyTree {
    pub name: Option<String>,
    pub members: Vec<FamilyMember>,
    pub loci: Vec<String>,
}

impl FamilyTree {
    pub fn member(&self, id: &str) -> Option<&FamilyMember> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Members with neither parent recorded.
    pub fn founders(&self) -> impl Iterator<Item = &FamilyMember> {
        self.members
            .iter()
            .filter(|m| m.father.is_none() && m.mother.is_none())
    }
}

/// One or several materialized trees, mirroring the input
/// [`PedigreeSet`] shape.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum FamilyTrees {
    Single(FamilyTree),
    Many(Vec<FamilyTree>),
}

impl FamilyTrees {
    pub fn iter(&self) -> impl Iterator<Item = &FamilyTree> {
        match self {
            FamilyTrees::Single(tree) => std::slice::from_ref(tree).iter(),
            FamilyTrees::Many(trees) => trees.iter(),
        }
    }
}

/// Materialize every pedigree in `pedigrees` against the shared genotype
/// table and locus list.
pub fn materialize(
    pedigrees: &PedigreeSet,
    datamatrix: Option<&GenotypeTable>,
    loci: &[Locus],
    founder_prefix: &str,
) -> FamilyTrees {
    match pedigrees {
        PedigreeSet::Single(ped) => {
            FamilyTrees::Single(materialize_one(None, ped, datamatrix, loci, founder_prefix))
        }
        PedigreeSet::Many(named) => FamilyTrees::Many(
            named
                .iter()
                .map(|(name, ped)| {
                    materialize_one(Some(name.clone()), ped, datamatrix, loci, founder_prefix)
                })
                .collect(),
        ),
    }
}

fn materialize_one(
    name: Option<String>,
    ped: &FamPedigree,
    datamatrix: Option<&GenotypeTable>,
    loci: &[Locus],
    founder_prefix: &str,
) -> FamilyTree {
    let locus_names: Vec<String> = loci.iter().map(|l| l.name.clone()).collect();
    let untyped = vec![None; locus_names.len()];
    let mut members: Vec<FamilyMember> = Vec::with_capacity(ped.len());
    let mut synthesized = 0usize;

    for i in 0..ped.len() {
        let id = &ped.ids[i];
        let mut father = parent_id(ped, ped.father_index[i]);
        let mut mother = parent_id(ped, ped.mother_index[i]);
        // One recorded parent: synthesize the other so the 0-or-2 rule holds.
        if father.is_some() != mother.is_some() {
            synthesized += 1;
            let new_id = format!("{founder_prefix}_{synthesized}");
            let sex = if father.is_none() { Sex::Male } else { Sex::Female };
            members.push(FamilyMember {
                id: new_id.clone(),
                father: None,
                mother: None,
                sex,
                genotypes: untyped.clone(),
            });
            if father.is_none() {
                father = Some(new_id);
            } else {
                mother = Some(new_id);
            }
        }
        let genotypes = datamatrix
            .and_then(|dm| dm.rows.get(id).cloned())
            .unwrap_or_else(|| untyped.clone());
        members.push(FamilyMember {
            id: id.clone(),
            father,
            mother,
            sex: ped.sex[i],
            genotypes,
        });
    }

    FamilyTree {
        name,
        members,
        loci: locus_names,
    }
}

fn parent_id(ped: &FamPedigree, index: usize) -> Option<String> {
    if index == 0 {
        None
    } else {
        Some(ped.ids[index - 1].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_synthesis_for_complete_pedigree() {
        let mut ped = FamPedigree::new();
        let fa = ped.push_individual("FA", Sex::Male);
        let mo = ped.push_individual("MO", Sex::Female);
        let ch = ped.push_individual("CH", Sex::Female);
        ped.assign_parent(fa, ch).unwrap();
        ped.assign_parent(mo, ch).unwrap();

        let trees = materialize(&PedigreeSet::Single(ped), None, &[], "added");
        match trees {
            FamilyTrees::Single(tree) => {
                assert_eq!(tree.members.len(), 3);
                assert_eq!(tree.founders().count(), 2);
                let ch = tree.member("CH").unwrap();
                assert_eq!(ch.father.as_deref(), Some("FA"));
                assert_eq!(ch.mother.as_deref(), Some("MO"));
            }
            other => panic!("expected a single tree, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_parent_is_synthesized() {
        let mut ped = FamPedigree::new();
        let mo = ped.push_individual("MO", Sex::Female);
        let ch = ped.push_individual("CH", Sex::Male);
        ped.assign_parent(mo, ch).unwrap();

        let trees = materialize(&PedigreeSet::Single(ped), None, &[], "added");
        match trees {
            FamilyTrees::Single(tree) => {
                assert_eq!(tree.members.len(), 3);
                let ch = tree.member("CH").unwrap();
                assert_eq!(ch.father.as_deref(), Some("added_1"));
                let added = tree.member("added_1").unwrap();
                assert_eq!(added.sex, Sex::Male);
                assert!(added.father.is_none() && added.mother.is_none());
            }
            other => panic!("expected a single tree, got {other:?}"),
        }
    }

    #[test]
    fn test_many_mirrors_input_shape() {
        let mut named = indexmap::IndexMap::new();
        named.insert("a".to_string(), FamPedigree::new());
        named.insert("b".to_string(), FamPedigree::new());
        let trees = materialize(&PedigreeSet::Many(named), None, &[], "added");
        match trees {
            FamilyTrees::Many(list) => {
                assert_eq!(list.len(), 2);
                assert_eq!(list[0].name.as_deref(), Some("a"));
            }
            other => panic!("expected many trees, got {other:?}"),
        }
    }
}
