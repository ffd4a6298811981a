use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use famfile::{
    commands::{famfile_check, famfile_convert, famfile_inspect},
    mutate::FallbackModel,
    prelude::{FamError, ReadFamOptions},
};

const INFO: &str = "\
famfile: read Familias .fam case files
usage: famfile [--help] <subcommand>

Subcommands:

  inspect: summarize the pedigrees, markers, and DVI content of a file.
  convert: export the genotype matrix as a TSV table.
  check: parse a file and report data-integrity diagnostics.

";

#[derive(Parser)]
#[clap(name = "famfile")]
#[clap(about = INFO)]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Arguments shared by every subcommand.
#[derive(Args)]
struct FamArgs {
    /// the input .fam file (plaintext or gzipped)
    #[arg(required = true)]
    fam: PathBuf,

    /// require a DVI section (error if the file has none)
    #[arg(long)]
    dvi: bool,

    /// ignore a DVI section even when present
    #[arg(long, conflicts_with = "dvi")]
    no_dvi: bool,

    /// label every locus as X-linked
    #[arg(long)]
    x_chromosome: bool,

    /// id prefix for synthesized founder parents
    #[arg(long, default_value = "added")]
    prefix: String,

    /// model substituted for structurally incompatible stepwise models
    #[arg(long, value_enum, default_value = "equal")]
    fallback: FallbackModel,

    /// keep duplicated DVI pedigree variants instead of collapsing them
    #[arg(long)]
    no_dedup: bool,

    /// keep the pedigree collection wrapper even for a single pedigree
    #[arg(long)]
    keep_list: bool,

    /// include the side-channel parameter bundle in the output
    #[arg(long)]
    params: bool,
}

impl FamArgs {
    fn options(&self, verbose: bool) -> ReadFamOptions {
        let use_dvi = if self.dvi {
            Some(true)
        } else if self.no_dvi {
            Some(false)
        } else {
            None
        };
        ReadFamOptions {
            use_dvi,
            x_chromosome: self.x_chromosome,
            founder_prefix: self.prefix.clone(),
            fallback_model: self.fallback,
            simplify_single: !self.keep_list,
            dedup_pedigrees: !self.no_dedup,
            include_params: self.params,
            verbose,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    Inspect {
        #[command(flatten)]
        args: FamArgs,
    },
    Convert {
        #[command(flatten)]
        args: FamArgs,

        /// an optional output file (standard output will be used if not specified)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Check {
        #[command(flatten)]
        args: FamArgs,
    },
}

fn run() -> Result<(), FamError> {
    let cli = Cli::parse();
    let verbose = cli.verbose > 0;
    let result = match &cli.command {
        Some(Commands::Inspect { args }) => famfile_inspect(&args.fam, &args.options(verbose)),
        Some(Commands::Convert { args, output }) => {
            famfile_convert(&args.fam, output.as_ref(), &args.options(verbose))
        }
        Some(Commands::Check { args }) => famfile_check(&args.fam, &args.options(verbose)),
        None => {
            println!("{}\n", INFO);
            std::process::exit(1);
        }
    };
    let _output = result?;
    Ok(())
}

fn main() {
    match run() {
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
