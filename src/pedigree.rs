//! The pedigree index model and genotype table types.
//!
//! A [`FamPedigree`] is the relational encoding Familias uses internally:
//! four parallel vectors of id, father index, mother index, and sex, where
//! a parent index is either 0 (no parent recorded) or a 1-based index into
//! the same vectors. A valid pedigree need not be connected, and individuals
//! may have one recorded parent; normalizing to the 0-or-2-parents form is
//! the materializer's job (see [`crate::materialize`]).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::FamError;

/// Recorded sex of an individual.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

impl Sex {
    pub fn opposite(&self) -> Sex {
        match self {
            Sex::Male => Sex::Female,
            Sex::Female => Sex::Male,
            Sex::Unknown => Sex::Unknown,
        }
    }
}

/// The index-based pedigree encoding recovered from a `.fam` file.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FamPedigree {
    pub ids: Vec<String>,
    /// 0 = no father recorded; otherwise a 1-based index into `ids`.
    pub father_index: Vec<usize>,
    /// 0 = no mother recorded; otherwise a 1-based index into `ids`.
    pub mother_index: Vec<usize>,
    pub sex: Vec<Sex>,
}

impl FamPedigree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Append an individual with no recorded parents; returns its 1-based index.
    pub fn push_individual(&mut self, id: impl Into<String>, sex: Sex) -> usize {
        self.ids.push(id.into());
        self.father_index.push(0);
        self.mother_index.push(0);
        self.sex.push(sex);
        self.ids.len()
    }

    /// 1-based index of `id`, if present.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|x| x == id).map(|i| i + 1)
    }

    /// Record `parent` (1-based) as a parent of `child` (1-based), choosing
    /// the father or mother slot from the parent's recorded sex.
    pub fn assign_parent(&mut self, parent: usize, child: usize) -> Result<(), FamError> {
        if parent == 0 || parent > self.len() || child == 0 || child > self.len() {
            return Err(FamError::CountMismatch {
                item_type: "relation index",
                declared: parent.max(child),
                found: self.len(),
            });
        }
        match self.sex[parent - 1] {
            Sex::Male => self.father_index[child - 1] = parent,
            Sex::Female => self.mother_index[child - 1] = parent,
            Sex::Unknown => {
                return Err(FamError::AmbiguousParentSex(self.ids[parent - 1].clone()))
            }
        }
        Ok(())
    }

    /// Check the structural invariant: every nonzero parent index points at
    /// an in-range individual of the expected sex.
    pub fn validate(&self) -> Result<(), FamError> {
        let n = self.len();
        for (i, &fi) in self.father_index.iter().enumerate() {
            if fi > n {
                return Err(FamError::CountMismatch {
                    item_type: "father index",
                    declared: fi,
                    found: n,
                });
            }
            if fi > 0 && self.sex[fi - 1] != Sex::Male {
                return Err(FamError::AmbiguousParentSex(format!(
                    "'{}' is recorded as father of '{}' but is not male",
                    self.ids[fi - 1],
                    self.ids[i]
                )));
            }
        }
        for (i, &mi) in self.mother_index.iter().enumerate() {
            if mi > n {
                return Err(FamError::CountMismatch {
                    item_type: "mother index",
                    declared: mi,
                    found: n,
                });
            }
            if mi > 0 && self.sex[mi - 1] != Sex::Female {
                return Err(FamError::AmbiguousParentSex(format!(
                    "'{}' is recorded as mother of '{}' but is not female",
                    self.ids[mi - 1],
                    self.ids[i]
                )));
            }
        }
        Ok(())
    }
}

/// One or several named pedigrees.
///
/// A file with no alternative hypotheses yields a single pedigree; a file
/// with explicit pedigree blocks yields several, keyed by name. The variant
/// is explicit so callers never have to guess whether a one-element
/// collection means "one pedigree" or "a list that happens to be short".
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum PedigreeSet {
    Single(FamPedigree),
    Many(IndexMap<String, FamPedigree>),
}

impl PedigreeSet {
    pub fn len(&self) -> usize {
        match self {
            PedigreeSet::Single(_) => 1,
            PedigreeSet::Many(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unwrap a one-element [`PedigreeSet::Many`] into [`PedigreeSet::Single`].
    /// Anything else is returned unchanged.
    pub fn simplify(self) -> PedigreeSet {
        match self {
            PedigreeSet::Many(m) if m.len() == 1 => {
                let (_, ped) = m.into_iter().next().unwrap();
                PedigreeSet::Single(ped)
            }
            other => other,
        }
    }

    /// Iterate pedigrees with their names; a single pedigree has no name.
    pub fn iter(&self) -> Box<dyn Iterator<Item = (Option<&str>, &FamPedigree)> + '_> {
        match self {
            PedigreeSet::Single(p) => Box::new(std::iter::once((None, p))),
            PedigreeSet::Many(m) => {
                Box::new(m.iter().map(|(name, p)| (Some(name.as_str()), p)))
            }
        }
    }
}

/// A genotype pair of allele labels at one locus.
pub type GenotypePair = (String, String);

/// Genotypes as raw allele indices, as read from the main section.
///
/// Each triple is `(allele1, allele2, marker)`, all 1-based (the file stores
/// them 0-based; the +1 offset is applied at read time). The line number the
/// triple was read from is kept so resolution failures can point back into
/// the file.
#[derive(Clone, Debug, Default)]
pub struct AlleleIndexTable {
    pub rows: IndexMap<String, Vec<IndexedGenotype>>,
}

#[derive(Clone, Copy, Debug)]
pub struct IndexedGenotype {
    pub allele1: usize,
    pub allele2: usize,
    pub marker: usize,
    pub line: usize,
}

impl AlleleIndexTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: &str, genotype: IndexedGenotype) {
        self.rows.entry(id.to_string()).or_default().push(genotype);
    }

    /// Resolve allele indices to labels against the parsed locus list,
    /// producing a label-valued [`GenotypeTable`] with one column per locus.
    pub fn resolve(&self, loci: &[crate::parsers::markers::Locus]) -> Result<GenotypeTable, FamError> {
        let names: Vec<String> = loci.iter().map(|l| l.name.clone()).collect();
        let mut table = GenotypeTable::new(names);
        for (id, genotypes) in &self.rows {
            table.insert_row(id);
            for g in genotypes {
                let locus = loci.get(g.marker - 1).ok_or_else(|| {
                    FamError::format(
                        g.line + 2,
                        format!("a marker index between 1 and {}", loci.len()),
                        g.marker.to_string(),
                    )
                })?;
                let label1 = locus.allele_label(g.allele1).ok_or_else(|| {
                    FamError::format(
                        g.line,
                        format!("an allele index between 1 and {}", locus.n_alleles()),
                        g.allele1.to_string(),
                    )
                })?;
                let label2 = locus.allele_label(g.allele2).ok_or_else(|| {
                    FamError::format(
                        g.line + 1,
                        format!("an allele index between 1 and {}", locus.n_alleles()),
                        g.allele2.to_string(),
                    )
                })?;
                table.set(id, g.marker - 1, (label1.to_string(), label2.to_string()));
            }
        }
        Ok(table)
    }
}

/// A genotype matrix: one row per individual, one column per locus, each
/// cell an optional pair of allele labels (`None` = untyped).
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct GenotypeTable {
    pub loci: Vec<String>,
    pub rows: IndexMap<String, Vec<Option<GenotypePair>>>,
}

impl GenotypeTable {
    pub fn new(loci: Vec<String>) -> Self {
        Self {
            loci,
            rows: IndexMap::new(),
        }
    }

    pub fn n_loci(&self) -> usize {
        self.loci.len()
    }

    pub fn n_individuals(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Add an all-untyped row for `id` if not already present.
    pub fn insert_row(&mut self, id: &str) {
        let n = self.loci.len();
        self.rows
            .entry(id.to_string())
            .or_insert_with(|| vec![None; n]);
    }

    pub fn set(&mut self, id: &str, locus_index: usize, pair: GenotypePair) {
        let n = self.loci.len();
        let row = self
            .rows
            .entry(id.to_string())
            .or_insert_with(|| vec![None; n]);
        row[locus_index] = Some(pair);
    }

    pub fn get(&self, id: &str, locus: &str) -> Option<&GenotypePair> {
        let col = self.loci.iter().position(|l| l == locus)?;
        self.rows.get(id)?.get(col)?.as_ref()
    }

    /// Column labels of the flattened matrix: `<locus>.1`, `<locus>.2` per locus.
    pub fn flat_columns(&self) -> Vec<String> {
        self.loci
            .iter()
            .flat_map(|l| [format!("{l}.1"), format!("{l}.2")])
            .collect()
    }
}
