use clap::Parser;
use log::{error, info};
use postalign::aligner::Minimap2;
use postalign::alignment_record::AlignmentFormat;
use postalign::collection::AlignmentCollection;
use postalign::error::{PostAlignError, Result};
use postalign::input::{load_minimap2, load_msa, load_paf};
use postalign::pipeline::Pipeline;
use postalign::processors::Processor;
use postalign::sequence::SeqType;
use rayon::ThreadPoolBuilder;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;

/// Post-process sequence alignments: codon-aware realignment, reference
/// trimming and FASTA/JSON output.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input alignment: an MSA in FASTA format or a PAF file with `cg:Z:` tags.
    /// Not needed with `--format minimap2`.
    #[clap(short = 'i', long, value_parser)]
    input: Option<String>,

    /// Input format. Detected from the input extension when omitted.
    #[clap(short = 'f', long, value_enum)]
    format: Option<AlignmentFormat>,

    /// Reference: a header name or FASTA file for MSA input, the reference
    /// FASTA for PAF and minimap2 input. Defaults to the first MSA record.
    #[clap(short = 'r', long, value_parser)]
    reference: Option<String>,

    /// Query sequences in FASTA format (PAF and minimap2 input).
    #[clap(short = 'p', long, value_parser)]
    queries: Option<String>,

    /// Output file. Writes to stdout when omitted.
    #[clap(short = 'o', long, value_parser)]
    output: Option<String>,

    /// Pipeline step `NAME[:KEY=VALUE,...]`, applied in the given order.
    /// Processors: codon-alignment, trim-by-ref, apply-frameshift, save-fasta,
    /// save-json.
    #[clap(short = 's', long = "step", value_parser, required = true)]
    steps: Vec<String>,

    /// minimap2 executable.
    #[clap(long, value_parser, default_value = "minimap2")]
    minimap2: String,

    /// Extra minimap2 arguments, e.g. "-x asm5".
    #[clap(long, value_parser, allow_hyphen_values = true)]
    minimap2_opts: Option<String>,

    /// Sequences are amino acids instead of nucleotides.
    #[clap(long, action)]
    amino_acids: bool,

    /// Remove invalid symbols instead of failing.
    #[clap(long, action)]
    skip_invalid: bool,

    /// Number of threads for parallel processing. Defaults to the number of CPUs.
    #[clap(short = 't', long, value_parser)]
    threads: Option<NonZeroUsize>,

    /// Verbosity level (0 = error, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    let threads = args.threads.map_or_else(num_cpus::get, NonZeroUsize::get);
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .map_err(io::Error::other)?;

    run(&args).map_err(|e| {
        error!("{}", e);
        io::Error::from(e)
    })
}

fn run(args: &Args) -> Result<()> {
    // parse steps before touching the inputs so typos fail fast
    let pipeline = Pipeline::from_specs(args.steps.as_slice())?;
    info!(
        "Pipeline: {}",
        pipeline
            .steps()
            .iter()
            .map(Processor::name)
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    let collection = load_collection(args)?;
    let result = pipeline.run(collection)?;

    match &args.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            writer.write_all(&result.output)?;
            writer.flush()?;
            info!("Wrote {} bytes to '{}'", result.output.len(), path);
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            writer.write_all(&result.output)?;
            writer.flush()?;
        }
    }
    Ok(())
}

fn load_collection(args: &Args) -> Result<AlignmentCollection> {
    let seq_type = if args.amino_acids {
        SeqType::AminoAcid
    } else {
        SeqType::Nucleotide
    };
    let format = match (args.format, args.input.as_deref()) {
        (Some(format), _) => format,
        (None, None) => AlignmentFormat::Minimap2,
        (None, Some(input)) => AlignmentFormat::from_path(input).ok_or_else(|| {
            PostAlignError::config(
                "input",
                format!("cannot detect the format of '{input}'; use --format"),
            )
        })?,
    };

    match format {
        AlignmentFormat::Msa => load_msa(
            required(args.input.as_deref(), "--input")?,
            args.reference.as_deref(),
            seq_type,
            args.skip_invalid,
        ),
        AlignmentFormat::Paf => load_paf(
            required(args.input.as_deref(), "--input")?,
            required(args.reference.as_deref(), "--reference")?,
            required(args.queries.as_deref(), "--queries")?,
            seq_type,
            args.skip_invalid,
        ),
        AlignmentFormat::Minimap2 => load_minimap2(
            required(args.reference.as_deref(), "--reference")?,
            required(args.queries.as_deref(), "--queries")?,
            &Minimap2::new(args.minimap2.as_str(), args.minimap2_opts.as_deref()),
            seq_type,
            args.skip_invalid,
        ),
    }
}

fn required<'a>(value: Option<&'a str>, flag: &str) -> Result<&'a str> {
    value.ok_or_else(|| PostAlignError::config("input", format!("{flag} is required")))
}
