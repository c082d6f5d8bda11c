use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::sync::Arc;

use rayon::prelude::*;

use ssmap_rust::index::fm::{FMIndex, IndexMeta};
use ssmap_rust::io;
use ssmap_rust::search::{
    Counters, DistanceMetric, MatchOpt, Matcher, PartitionPolicy, Strategy, TextOcc,
};
use ssmap_rust::util::dna;

#[derive(Parser, Debug)]
#[command(
    name = "ssmap",
    author,
    version,
    about = "Approximate read matching with search schemes over a bidirectional FM index",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PartitionArg {
    Uniform,
    Static,
    Dynamic,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MetricArg {
    Hamming,
    Editnaive,
    Editopt,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the bidirectional FM index from a reference FASTA
    Index {
        /// Reference FASTA file
        reference: String,
        /// Output prefix for the index file (<prefix>.fm)
        #[arg(short, long, default_value = "ref")]
        output: String,
        /// Suffix array sparseness factor, a power of two in [1, 256]
        #[arg(short = 's', long = "sa-sparseness", default_value_t = 1)]
        sa_sparseness: usize,
        /// Block size of the occurrence tables
        #[arg(long = "occ-block", default_value_t = 512)]
        occ_block: usize,
    },
    /// Match reads approximately against a prebuilt index
    Match {
        /// Index basename (expects <basename>.fm)
        basename: String,
        /// Reads file (fa/fasta, fq/fastq or csv)
        reads: String,
        /// Maximum edit (or Hamming) distance
        #[arg(short = 'e', long = "max-ed", default_value_t = 0)]
        max_ed: usize,
        /// Must agree with the sparseness the index was built with
        #[arg(short = 's', long = "sa-sparseness")]
        sa_sparseness: Option<usize>,
        #[arg(short = 'p', long = "partitioning", value_enum, default_value = "dynamic")]
        partitioning: PartitionArg,
        #[arg(short = 'm', long = "metric", value_enum, default_value = "editopt")]
        metric: MetricArg,
        /// Range width threshold for switching to in-text verification
        #[arg(short = 'i', long = "in-text", default_value_t = 5)]
        in_text: usize,
        /// kuch1, kuch2, kianfar, manbest, pigeon, 01*0, naive or custom
        #[arg(long = "search-scheme", alias = "ss", default_value = "kuch1")]
        search_scheme: String,
        /// Folder with a custom search scheme (required with --search-scheme custom)
        #[arg(long = "scheme-dir")]
        scheme_dir: Option<String>,
        #[arg(short = 't', long = "threads", default_value_t = 1)]
        threads: usize,
        /// Output TSV path (default: <reads>_output.tsv)
        #[arg(short, long)]
        out: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Index { reference, output, sa_sparseness, occ_block } => {
            run_index(&reference, &output, sa_sparseness, occ_block)
        }
        Commands::Match {
            basename,
            reads,
            max_ed,
            sa_sparseness,
            partitioning,
            metric,
            in_text,
            search_scheme,
            scheme_dir,
            threads,
            out,
        } => run_match(MatchArgs {
            basename,
            reads,
            max_ed,
            sa_sparseness,
            partitioning,
            metric,
            in_text,
            search_scheme,
            scheme_dir,
            threads,
            out,
        }),
    }
}

fn sparseness_shift(factor: usize) -> Result<u8> {
    if factor == 0 || factor > 256 || !factor.is_power_of_two() {
        bail!("{} is not allowed as sparse factor, should be a power of two in [1, 256]", factor);
    }
    Ok(factor.trailing_zeros() as u8)
}

fn run_index(reference: &str, output: &str, sa_sparseness: usize, occ_block: usize) -> Result<()> {
    let shift = sparseness_shift(sa_sparseness)?;
    if occ_block == 0 {
        bail!("occ block size must be positive");
    }

    let fh = std::fs::File::open(reference)
        .map_err(|e| anyhow!("cannot open reference FASTA '{}': {}", reference, e))?;
    let records = io::reads::read_fasta(std::io::BufReader::new(fh))?;
    if records.is_empty() {
        bail!("FASTA file '{}' contains no sequences", reference);
    }

    // 序列依次拼接，序列之间与末尾都以哨兵分隔
    let mut text: Vec<u8> = Vec::new();
    let mut total_len = 0usize;
    for rec in &records {
        if rec.seq.is_empty() {
            bail!("sequence '{}' in '{}' is empty", rec.id, reference);
        }
        let enc = dna::encode_reference(&rec.seq).ok_or_else(|| {
            anyhow!("sequence '{}' contains characters outside ACGT", rec.id)
        })?;
        total_len += enc.len();
        text.extend_from_slice(&enc);
        text.push(0);
    }

    println!("reference: {}", reference);
    println!("sequences: {}", records.len());
    println!("total_len: {}", total_len);
    println!("sa_sparseness: {}", sa_sparseness);

    let mut fm = FMIndex::build(text, shift, occ_block);
    fm.set_meta(IndexMeta {
        reference_file: Some(reference.to_string()),
        build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
        build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
    });

    let out_path = format!("{}.fm", output);
    fm.save_to_file(&out_path)
        .map_err(|e| anyhow!("cannot write index to '{}': {}", out_path, e))?;
    println!("index saved: {}", out_path);
    Ok(())
}

struct MatchArgs {
    basename: String,
    reads: String,
    max_ed: usize,
    sa_sparseness: Option<usize>,
    partitioning: PartitionArg,
    metric: MetricArg,
    in_text: usize,
    search_scheme: String,
    scheme_dir: Option<String>,
    threads: usize,
    out: Option<String>,
}

fn run_match(args: MatchArgs) -> Result<()> {
    if args.max_ed > 4 {
        bail!("{} is not allowed as max distance, should be in [0, 4]", args.max_ed);
    }

    let index_path = format!("{}.fm", args.basename);
    let fm = Arc::new(FMIndex::load_from_file(&index_path)?);
    if let Some(factor) = args.sa_sparseness {
        let shift = sparseness_shift(factor)?;
        if shift != fm.sparse_shift {
            bail!(
                "index '{}' was built with sparseness {}, not {}",
                index_path,
                1usize << fm.sparse_shift,
                factor
            );
        }
    }

    let strategy = if args.search_scheme == "custom" {
        let dir = args
            .scheme_dir
            .as_deref()
            .ok_or_else(|| anyhow!("custom search scheme takes a folder (--scheme-dir)"))?;
        Strategy::from_folder(std::path::Path::new(dir))?
    } else {
        Strategy::builtin(&args.search_scheme)?
    };

    let opt = MatchOpt {
        max_ed: args.max_ed,
        partition: match args.partitioning {
            PartitionArg::Uniform => PartitionPolicy::Uniform,
            PartitionArg::Static => PartitionPolicy::Static,
            PartitionArg::Dynamic => PartitionPolicy::Dynamic,
        },
        metric: match args.metric {
            MetricArg::Hamming => DistanceMetric::Hamming,
            MetricArg::Editnaive => DistanceMetric::EditNaive,
            MetricArg::Editopt => DistanceMetric::EditOpt,
        },
        switch_point: args.in_text,
    };

    println!("reading reads from {}", args.reads);
    let reads = io::reads::read_reads(&args.reads)?;
    println!(
        "matching {} reads with {} strategy, max distance {}, {:?} partitioning, {:?} metric",
        reads.len(),
        strategy.name,
        args.max_ed,
        args.partitioning,
        args.metric
    );
    println!("switching to in-text verification at width {}", opt.switch_point);

    let out_path = args
        .out
        .clone()
        .unwrap_or_else(|| format!("{}_output.tsv", args.reads));
    let mut out: Box<dyn Write> = Box::new(std::io::BufWriter::new(
        std::fs::File::create(&out_path)
            .map_err(|e| anyhow!("cannot create output file '{}': {}", out_path, e))?,
    ));
    writeln!(out, "identifier\tposition\tlength\tED\tCIGAR\treverseComplement")?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build()
        .map_err(|e| anyhow!("cannot build thread pool: {}", e))?;

    let matcher = Matcher::new(&fm, &strategy, opt)?;

    let start = std::time::Instant::now();
    let mut totals = Counters::default();
    let mut total_matches = 0usize;
    let mut mapped_reads = 0usize;

    // 批量读取并并行匹配；结果按输入顺序收集，输出与线程数无关
    let batch_size = 1000;
    for batch in reads.chunks(batch_size) {
        let matcher = &matcher;
        let results: Vec<(Vec<String>, Counters, usize)> = pool.install(|| {
            batch
                .par_iter()
                .map(|rec| {
                    let mut counters = Counters::default();
                    let fwd = matcher.match_approx(&rec.seq, &mut counters);
                    let rc = dna::revcomp(&rec.seq);
                    let rev = matcher.match_approx(&rc, &mut counters);
                    let mut lines = Vec::with_capacity(fwd.len() + rev.len());
                    let n_matches = fwd.len() + rev.len();
                    push_tsv_lines(&mut lines, &rec.id, &fwd, false);
                    push_tsv_lines(&mut lines, &rec.id, &rev, true);
                    (lines, counters, n_matches)
                })
                .collect()
        });
        for (lines, counters, n_matches) in results {
            for line in &lines {
                writeln!(out, "{}", line)?;
            }
            totals.merge(&counters);
            total_matches += n_matches;
            mapped_reads += (n_matches > 0) as usize;
        }
    }
    out.flush()?;
    let elapsed = start.elapsed();

    println!("total duration: {:.2}s", elapsed.as_secs_f64());
    println!("mapped reads: {}/{}", mapped_reads, reads.len());
    println!("total unique matches: {}", total_matches);
    println!("index nodes visited: {}", totals.nodes);
    println!("reported positions before dedup: {}", totals.reported_positions);
    println!("searches started: {}", totals.searches_started);
    println!("unique matches via pure in-index matching: {}", totals.cigars_in_index);
    println!("in-text verification procedures: {}", totals.in_text_started);
    println!("reported matches via in-text verification: {}", totals.cigars_in_text);
    println!("unique matches via in-text verification: {}", totals.useful_cigars_in_text);
    println!("failed in-text verifications: {}", totals.aborted_in_text);
    println!("immediate switches after the first part: {}", totals.immediate_switch);
    println!("output written to {}", out_path);
    Ok(())
}

fn push_tsv_lines(lines: &mut Vec<String>, id: &str, occs: &[TextOcc], revcomp: bool) {
    for occ in occs {
        lines.push(format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            id,
            occ.range.begin,
            occ.len(),
            occ.distance,
            occ.cigar,
            revcomp as u8
        ));
    }
}
