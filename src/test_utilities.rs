//! Test cases and test utility functions.
//!
//! Builders for synthetic `.fam` content. The format is positional, so the
//! builders mirror the strides the parsers expect: an individual record is
//! `6 + 3*n` lines, a locus block `13 + 2*n` lines, and so on. Values that
//! the format stores 0-based (allele and relation indices) are taken raw
//! here; the +1 shift happens in the parsers.

use rand::{thread_rng, Rng};
use std::io::Write;
use tempfile::NamedTempFile;

use crate::pedigree::Sex;

// Synthetic file defaults for stochastic tests and benchmarks.
pub const NRANDOM_INDIVIDUALS: usize = 500;
pub const NRANDOM_LOCI: usize = 20;
pub const NRANDOM_ALLELES: usize = 8;

fn flag(value: bool) -> String {
    if value { "#TRUE#" } else { "#FALSE#" }.to_string()
}

/// The fixed file head: two banner lines, the version line, and the
/// individual count on line 4.
pub fn fam_header(n_individuals: usize) -> Vec<String> {
    vec![
        "Output from Familias".to_string(),
        "(Internal data structures)".to_string(),
        "Familias 3".to_string(),
        n_individuals.to_string(),
    ]
}

/// One individual record: id, two filler lines, the dropout and sex flags,
/// and the genotype triples as raw `(allele1, allele2, marker)` 0-based
/// indices.
pub fn individual_record(
    id: &str,
    dropout: bool,
    sex: Sex,
    genotypes: &[(usize, usize, usize)],
) -> Vec<String> {
    let mut lines = vec![
        id.to_string(),
        String::new(),
        flag(dropout),
        String::new(),
        flag(sex == Sex::Male),
        genotypes.len().to_string(),
    ];
    for (a1, a2, marker) in genotypes {
        lines.push(a1.to_string());
        lines.push(a2.to_string());
        lines.push(marker.to_string());
    }
    lines
}

/// The `Known relations` block plus a zero pedigree count: extra-female and
/// extra-male counts, then raw 0-based `(parent, child)` index pairs.
pub fn known_relations(
    n_female: usize,
    n_male: usize,
    relations: &[(usize, usize)],
) -> Vec<String> {
    let mut lines = vec![
        "Known relations".to_string(),
        n_female.to_string(),
        n_male.to_string(),
        relations.len().to_string(),
    ];
    for (parent, child) in relations {
        lines.push(parent.to_string());
        lines.push(child.to_string());
    }
    lines.push("0".to_string());
    lines
}

/// The precomputed-probabilities flag (off) and the theta line.
pub fn tail_section(theta: f64) -> Vec<String> {
    vec![flag(false), format!("Theta = {theta}")]
}

/// Parameters of one synthetic locus block.
#[derive(Clone, Debug)]
pub struct LocusSpec {
    pub name: String,
    pub alleles: Vec<(String, f64)>,
    pub rate: f64,
    pub rate2: f64,
    pub range: f64,
    pub female_code: i64,
    pub male_code: i64,
    pub database_size: Option<u64>,
    pub dropout: Option<f64>,
    pub minor_af: Option<f64>,
    pub silent_frequency: Option<f64>,
}

impl LocusSpec {
    /// A locus with the equal mutation model for both sexes.
    pub fn equal(name: &str, alleles: &[(&str, f64)], rate: f64) -> Self {
        Self {
            name: name.to_string(),
            alleles: alleles
                .iter()
                .map(|(label, freq)| (label.to_string(), *freq))
                .collect(),
            rate,
            rate2: 0.0,
            range: 0.1,
            female_code: 0,
            male_code: 0,
            database_size: None,
            dropout: None,
            minor_af: None,
            silent_frequency: None,
        }
    }
}

/// Serialize one locus block: the 13 header lines, then the alternating
/// allele/frequency lines.
pub fn locus_block(spec: &LocusSpec) -> Vec<String> {
    let mut info = format!("{} alleles", spec.alleles.len());
    if let Some(size) = spec.database_size {
        info.push_str(&format!(", DatabaseSize = {size}"));
    }
    if let Some(dropout) = spec.dropout {
        info.push_str(&format!(", Dropout = {dropout}"));
    }
    if let Some(maf) = spec.minor_af {
        info.push_str(&format!(", MinorAF = {maf}"));
    }
    let mut lines = vec![
        spec.name.clone(),
        spec.rate.to_string(),
        spec.rate.to_string(),
        spec.female_code.to_string(),
        spec.male_code.to_string(),
        (spec.alleles.len() + 1).to_string(),
        spec.range.to_string(),
        spec.range.to_string(),
        spec.rate2.to_string(),
        spec.rate2.to_string(),
        flag(spec.silent_frequency.is_some()),
        spec.silent_frequency.unwrap_or(0.0).to_string(),
        info,
    ];
    for (label, freq) in &spec.alleles {
        lines.push(label.clone());
        lines.push(freq.to_string());
    }
    lines
}

/// The marker database section: name line, locus count, locus blocks.
pub fn marker_section(database_name: &str, specs: &[LocusSpec]) -> Vec<String> {
    let mut lines = vec![database_name.to_string(), specs.len().to_string()];
    for spec in specs {
        lines.extend(locus_block(spec));
    }
    lines
}

/// Normalized random allele frequencies.
pub fn random_frequencies(n: usize) -> Vec<f64> {
    let mut rng = thread_rng();
    let raw: Vec<f64> = (0..n).map(|_| rng.gen_range(0.05..1.0)).collect();
    let total: f64 = raw.iter().sum();
    raw.iter().map(|f| f / total).collect()
}

/// A complete synthetic `.fam` file: `n_individuals` unrelated typed
/// individuals over `n_loci` equal-model loci of `n_alleles` alleles each.
pub fn synthetic_fam(n_individuals: usize, n_loci: usize, n_alleles: usize) -> Vec<String> {
    let mut rng = thread_rng();
    let mut lines = fam_header(n_individuals);
    for i in 0..n_individuals {
        let genotypes: Vec<(usize, usize, usize)> = (0..n_loci)
            .map(|m| {
                (
                    rng.gen_range(0..n_alleles),
                    rng.gen_range(0..n_alleles),
                    m,
                )
            })
            .collect();
        let sex = if i % 2 == 0 { Sex::Male } else { Sex::Female };
        lines.extend(individual_record(
            &format!("person_{}", i + 1),
            false,
            sex,
            &genotypes,
        ));
    }
    lines.extend(known_relations(0, 0, &[]));
    lines.extend(tail_section(0.0));

    let specs: Vec<LocusSpec> = (0..n_loci)
        .map(|m| {
            let freqs = random_frequencies(n_alleles);
            let alleles: Vec<(String, f64)> = freqs
                .iter()
                .enumerate()
                .map(|(j, f)| ((10 + j).to_string(), *f))
                .collect();
            LocusSpec {
                name: format!("L{}", m + 1),
                alleles,
                rate: 0.001,
                rate2: 0.0,
                range: 0.1,
                female_code: 0,
                male_code: 0,
                database_size: None,
                dropout: None,
                minor_af: None,
                silent_frequency: None,
            }
        })
        .collect();
    lines.extend(marker_section("syntheticDB", &specs));
    lines
}

/// A DVI person node at bracket depth `depth`, with optional DNA triples.
pub fn dvi_person(
    depth: usize,
    id: &str,
    gender: &str,
    dna: &[(&str, &str, &str)],
) -> Vec<String> {
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

/// Write `lines` to a named temporary file.
pub fn temp_famfile(lines: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("cannot create temporary file");
    for line in lines {
        writeln!(file, "{line}").expect("cannot write temporary file");
    }
    file.flush().expect("cannot flush temporary file");
    file
}
