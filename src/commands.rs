//! The subcommand functions behind the `famfile` binary.

use std::path::PathBuf;

use crate::error::FamError;
use crate::io::OutputFile;
use crate::materialize::materialize;
use crate::parsers::{read_fam, FamOutput, FamResult, ReadFamOptions};
use crate::pedigree::GenotypeTable;
use crate::reporting::{CommandOutput, Report};

/// The string written for untyped genotype cells in TSV output.
const NO_VALUE: &str = ".";

/// Summarize a `.fam` file: version, result shape, loci, diagnostics.
pub fn famfile_inspect(
    filepath: &PathBuf,
    options: &ReadFamOptions,
) -> Result<CommandOutput<()>, FamError> {
    let output = read_fam(filepath, options)?;
    println!("format version: {}", output.version);
    match &output.result {
        FamResult::Pedigrees {
            pedigrees,
            datamatrix,
        } => {
            println!("pedigrees: {}", pedigrees.len());
            for (name, ped) in pedigrees.iter() {
                println!(
                    "  {} ({} individuals)",
                    name.unwrap_or("(unnamed)"),
                    ped.len()
                );
            }
            println!("typed individuals: {}", datamatrix.n_individuals());
            let trees = materialize(
                pedigrees,
                Some(datamatrix),
                &output.loci,
                &options.founder_prefix,
            );
            let recorded: usize = pedigrees.iter().map(|(_, p)| p.len()).sum();
            let total: usize = trees.iter().map(|t| t.members.len()).sum();
            println!("synthesized founders: {}", total - recorded);
        }
        FamResult::Dvi {
            families,
            unidentified,
        } => {
            println!("reference families: {}", families.len());
            for family in families.values() {
                println!(
                    "  {} ({} pedigree variants, {} typed persons)",
                    family.name,
                    family.pedigrees.len(),
                    family.datamatrix.n_individuals()
                );
            }
            if let Some(un) = unidentified {
                println!("unidentified persons: {}", un.pedigree.len());
            }
        }
    }
    println!("loci: {}", output.loci.len());
    for locus in &output.loci {
        println!(
            "  {} ({} alleles, {:?}/{:?})",
            locus.name,
            locus.n_alleles(),
            locus.female_model.kind,
            locus.male_model.kind
        );
    }
    if let Some(params) = &output.params {
        println!("database: {}", params.database_name);
        if let Some(theta) = params.theta {
            println!("theta: {theta}");
        }
    }
    let report = output.report.clone();
    Ok(CommandOutput::new((), report))
}

/// Export the genotype matrix as TSV, one row per typed individual.
pub fn famfile_convert(
    filepath: &PathBuf,
    output_path: Option<&PathBuf>,
    options: &ReadFamOptions,
) -> Result<CommandOutput<()>, FamError> {
    let output = read_fam(filepath, options)?;
    let output_stream = output_path.map_or(OutputFile::new_stdout(None), |file| {
        OutputFile::new(file, None)
    });
    let writer = output_stream.writer()?;
    let mut tsv = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);

    let locus_names: Vec<String> = output.loci.iter().map(|l| l.name.clone()).collect();
    let mut header = vec!["famid".to_string(), "id".to_string()];
    for name in &locus_names {
        header.push(format!("{name}.1"));
        header.push(format!("{name}.2"));
    }
    tsv.write_record(&header)?;

    match &output.result {
        FamResult::Pedigrees { datamatrix, .. } => {
            write_matrix(&mut tsv, "", datamatrix, &locus_names)?;
        }
        FamResult::Dvi {
            families,
            unidentified,
        } => {
            if let Some(un) = unidentified {
                write_matrix(&mut tsv, "", &un.datamatrix, &locus_names)?;
            }
            for family in families.values() {
                write_matrix(&mut tsv, &family.name, &family.datamatrix, &locus_names)?;
            }
        }
    }
    tsv.flush()?;
    Ok(CommandOutput::new((), output.report))
}

fn write_matrix<W: std::io::Write>(
    tsv: &mut csv::Writer<W>,
    famid: &str,
    table: &GenotypeTable,
    locus_names: &[String],
) -> Result<(), FamError> {
    for id in table.rows.keys() {
        let mut record = vec![famid.to_string(), id.clone()];
        for locus in locus_names {
            match table.get(id, locus) {
                Some((a1, a2)) => {
                    record.push(a1.clone());
                    record.push(a2.clone());
                }
                None => {
                    record.push(NO_VALUE.to_string());
                    record.push(NO_VALUE.to_string());
                }
            }
        }
        tsv.write_record(&record)?;
    }
    Ok(())
}

/// Parse a file and report its diagnostics; the parse result is discarded.
pub fn famfile_check(
    filepath: &PathBuf,
    options: &ReadFamOptions,
) -> Result<CommandOutput<()>, FamError> {
    let FamOutput { report, .. } = read_fam(filepath, options)?;
    if report.is_empty() {
        println!("{}: ok", filepath.display());
    } else {
        println!(
            "{}: ok with {} data-integrity issue(s)",
            filepath.display(),
            report.entries().len()
        );
        report.narrate();
    }
    Ok(CommandOutput::new((), Report::new()))
}
