use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use seqforest::feed::{FileFeed, RecordFormat};
use seqforest::forest::report::{report_twilight, write_tree};
use seqforest::{
    ForestConfig, LinkReader, LinkWeighting, LinkWriter, ReportConfig, SearchConfig, Searcher,
    SpanningForest, TailPolicy,
};

#[derive(Parser)]
#[command(name = "seqforest")]
#[command(about = "Protein similarity search and maximum spanning forest construction", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every query against the database, writing links above the threshold
    Search {
        /// Query sequences
        #[arg(value_name = "QUERIES")]
        queries: PathBuf,

        /// Database sequences
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Record format of both inputs: fasta or tabular
        #[arg(short = 'f', long, value_name = "FORMAT", default_value = "fasta")]
        format: RecordFormat,

        /// Scoring matrix: BLOSUM62, PAM40, PAM120, PAM200, PAM250
        #[arg(short = 'm', long, value_name = "NAME", default_value = "BLOSUM62")]
        matrix: String,

        /// Linear gap penalty
        #[arg(short = 'g', long, value_name = "INT", default_value = "10")]
        gap_penalty: i16,

        /// Report hits scoring strictly above this
        #[arg(short = 'T', long, value_name = "INT", default_value = "0")]
        threshold: i16,

        /// Lanes stepped together (rounded up to a multiple of 16)
        #[arg(short = 'l', long, value_name = "INT", default_value = "64")]
        lanes: usize,

        /// Steps planned per dispatch
        #[arg(short = 's', long, value_name = "INT", default_value = "256")]
        steps_per_dispatch: usize,

        /// What to do with lanes still mid-target when the database runs out: drain or discard
        #[arg(long, value_name = "POLICY", default_value = "drain")]
        tail: TailPolicy,

        /// Also report a query's hit against itself
        #[arg(long)]
        keep_self_hits: bool,

        /// Output link file (default: stdout)
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Also write `id<TAB>name` for every database record
        #[arg(long, value_name = "FILE")]
        labels_out: Option<PathBuf>,

        /// Verbose level: 1=error, 2=warning, 3=message, 4=debug, 5+=trace
        #[arg(short = 'v', long, value_name = "INT", default_value = "3")]
        verbosity: i32,
    },

    /// Build the maximum spanning forest from link files and render it
    Forest {
        /// Link files written by `search`
        #[arg(value_name = "LINKS", required = true)]
        links: Vec<PathBuf>,

        /// `id<TAB>label` lines naming the nodes
        #[arg(short = 'L', long, value_name = "FILE")]
        labels: Option<PathBuf>,

        /// Edge weight: raw or per-100 (score per hundred target residues)
        #[arg(short = 'w', long, value_name = "WEIGHTING", default_value = "raw")]
        weighting: LinkWeighting,

        /// Edges scoring below this are not descended into
        #[arg(long, value_name = "INT", default_value = "0")]
        stub_threshold: i32,

        /// Lower bound of the twilight band
        #[arg(long, value_name = "INT", default_value = "20")]
        twilight_low: i32,

        /// Upper bound of the twilight band
        #[arg(long, value_name = "INT", default_value = "40")]
        twilight_high: i32,

        /// Leave twilight pairs whose two labels are identical out of the listing
        #[arg(long)]
        skip_same_label: bool,

        /// Output report file (default: stdout)
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Verbose level: 1=error, 2=warning, 3=message, 4=debug, 5+=trace
        #[arg(short = 'v', long, value_name = "INT", default_value = "3")]
        verbosity: i32,
    },
}

fn init_logging(verbosity: i32) {
    let log_level = match verbosity {
        v if v <= 1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        4 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();
}

fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn read_labels(path: &Path) -> anyhow::Result<HashMap<u32, String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening labels {}", path.display()))?;

    let mut labels = HashMap::new();
    for record in reader.deserialize::<(u32, String)>() {
        let (id, label) = record.with_context(|| format!("reading labels {}", path.display()))?;
        labels.insert(id, label);
    }
    Ok(labels)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            queries,
            database,
            format,
            matrix,
            gap_penalty,
            threshold,
            lanes,
            steps_per_dispatch,
            tail,
            keep_self_hits,
            output,
            labels_out,
            verbosity,
        } => {
            init_logging(verbosity);

            let config = SearchConfig {
                matrix,
                gap_penalty,
                reporting_threshold: threshold,
                lanes,
                steps_per_dispatch,
                tail_policy: tail,
                skip_self_hits: !keep_self_hits,
                ..SearchConfig::default()
            };
            let searcher = Searcher::new(config).context("invalid search configuration")?;

            let queries = FileFeed::open(&queries, format)
                .with_context(|| format!("loading queries {}", queries.display()))?;
            let targets = FileFeed::open(&database, format)
                .with_context(|| format!("loading database {}", database.display()))?;
            log::info!(
                "Searching {} queries against {} targets",
                queries.remaining(),
                targets.remaining()
            );

            if let Some(path) = labels_out {
                let mut writer = csv::WriterBuilder::new()
                    .delimiter(b'\t')
                    .has_headers(false)
                    .from_path(&path)
                    .with_context(|| format!("creating {}", path.display()))?;
                for label in targets.labels() {
                    writer.serialize(label)?;
                }
                writer.flush()?;
            }

            let mut links = LinkWriter::new(open_output(output.as_deref())?);
            let stats = searcher.search_many(queries, || Ok(targets.clone()), &mut links)?;
            links.flush()?;

            if stats.discarded > 0 {
                log::warn!("{} targets were dropped unfinished", stats.discarded);
            }
            log::info!(
                "Wrote {} links ({} dispatches, {} steps)",
                links.written(),
                stats.dispatches,
                stats.steps
            );
        }

        Commands::Forest {
            links,
            labels,
            weighting,
            stub_threshold,
            twilight_low,
            twilight_high,
            skip_same_label,
            output,
            verbosity,
        } => {
            init_logging(verbosity);

            let report_config = ReportConfig {
                stub_threshold,
                twilight_low,
                twilight_high,
            };
            report_config
                .validate()
                .context("invalid report configuration")?;

            let labels = match &labels {
                Some(path) => read_labels(path)?,
                None => HashMap::new(),
            };

            let mut forest = SpanningForest::with_config(&ForestConfig { weighting });
            for path in &links {
                let file =
                    File::open(path).with_context(|| format!("opening links {}", path.display()))?;
                let mut reader = LinkReader::new(io::BufReader::new(file));
                let hits = reader
                    .by_ref()
                    .collect::<seqforest::Result<Vec<_>>>()
                    .with_context(|| format!("reading links {}", path.display()))?;
                forest.ingest_all(hits);
                if reader.skipped() > 0 {
                    log::warn!(
                        "Skipped {} malformed links in {}",
                        reader.skipped(),
                        path.display()
                    );
                }
            }

            let stats = forest.stats();
            if stats.links_processed == 0 {
                bail!("no links to build a forest from");
            }
            log::info!(
                "{} links: {} added, {} replaced, {} rejected; {} edges over {} nodes (max id {}), total weight {}",
                stats.links_processed,
                stats.links_added,
                stats.links_replaced,
                stats.links_rejected,
                forest.edge_count(),
                forest.node_ids().count(),
                forest.max_seen_id(),
                forest.total_weight()
            );

            let mut out = open_output(output.as_deref())?;
            let tree = write_tree(&forest, &labels, &report_config, &mut out)?;
            writeln!(out)?;

            let same_label = |a: u32, b: u32| {
                skip_same_label
                    && matches!((labels.get(&a), labels.get(&b)), (Some(x), Some(y)) if x == y)
            };
            let twilight = report_twilight(&forest, &labels, &same_label, &report_config, &mut out)?;
            out.flush()?;

            log::info!(
                "Rendered {} nodes in {} components ({} stubs, {} isolated); {} twilight links, {} suppressed",
                tree.rendered,
                tree.components,
                tree.stubs,
                tree.isolated,
                twilight.listed,
                twilight.suppressed
            );
        }
    }

    Ok(())
}
