use crate::config::{Config, load_config};
use crate::pipeline::{BuildOptions, BuildReport, build};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "lifemap",
    version,
    about = "Build the Lifemap tree of life from the NCBI taxonomy"
)]
pub struct Args {
    /// Directory holding nodes.dmp, names.dmp and the optional translation files
    #[arg(short = 't', long = "taxonomy")]
    pub taxonomy: PathBuf,

    /// Output directory for feature tables, COPY files and metadata
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Config file (JSON or JSON5)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Remove environmental, unclassified and unidentified taxa
    #[arg(long)]
    pub simplify: bool,

    /// NCBI genome report (eukaryotes.txt, prokaryotes.txt); repeatable
    #[arg(short = 'g', long = "genomes")]
    pub genomes: Vec<PathBuf>,

    /// TimeTree ages CSV (node,age). Defaults to timetreetimes.csv in the taxonomy directory
    #[arg(short = 'a', long = "ages")]
    pub ages: Option<PathBuf>,

    /// Skip genome counts and ages
    #[arg(long)]
    pub skip_add_info: bool,

    /// Skip the lmdata export
    #[arg(long)]
    pub skip_lmdata: bool,

    /// Log debug output (overridden by RUST_LOG)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Args {
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            taxonomy_dir: self.taxonomy.clone(),
            output_dir: self.output.clone(),
            genome_reports: self.genomes.clone(),
            ages: self.ages.clone(),
            skip_add_info: self.skip_add_info,
            skip_lmdata: self.skip_lmdata,
        }
    }

    /// Applies command line overrides to a loaded config.
    pub fn apply(&self, mut config: Config) -> Config {
        if self.simplify {
            config.simplify = true;
        }
        config
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "lifemap_builder=debug" } else { "lifemap_builder=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(args.config.as_deref())
        .with_context(|| format!("loading config {:?}", args.config))?;
    let config = args.apply(config);
    let options = args.build_options();

    let report = build(&options, &config)?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &BuildReport) {
    for group in &report.groups {
        println!(
            "{}: {} nodes, {} species, {} clades, max zoom {}",
            group.group.name(),
            group.layout.node_count,
            group.layout.leaf_count,
            group.synthesis.clades,
            group.layout.max_zoom
        );
    }
    println!(
        "total: {} species, last id {}",
        report.species.total, report.last_id
    );
}
