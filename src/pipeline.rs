//! The whole build: ingestion, then layout, synthesis and feature tables for
//! each group in turn, then the merged tables and metadata.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::aggregate::{self, Ages, GenomeCounts};
use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::export::{self, CompleteRow, Metadata, SpeciesCounts};
use crate::geometry::{self, SynthesisSummary};
use crate::layout::{self, Group, IdAllocator, LayoutSummary};
use crate::sink::{CopyFileSink, RecordSink};
use crate::taxonomy::{SimplifyStats, Taxonomy, simplify};

/// Id after which numbering of the first group starts.
pub const FIRST_ID: u64 = 1;
/// Default TimeTree ages file, looked up in the taxonomy directory.
pub const AGES_FILE: &str = "timetreetimes.csv";

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Directory holding `nodes.dmp`, `names.dmp` and translation files.
    pub taxonomy_dir: PathBuf,
    pub output_dir: PathBuf,
    /// NCBI genome reports; counts of all files are summed.
    pub genome_reports: Vec<PathBuf>,
    pub ages: Option<PathBuf>,
    pub skip_add_info: bool,
    pub skip_lmdata: bool,
}

impl BuildOptions {
    pub fn db_dir(&self) -> PathBuf {
        self.output_dir.join("db")
    }

    pub fn lmdata_dir(&self) -> PathBuf {
        self.output_dir.join("lmdata")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupReport {
    pub group: Group,
    pub layout: LayoutSummary,
    pub synthesis: SynthesisSummary,
    pub simplified: Option<SimplifyStats>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub groups: Vec<GroupReport>,
    /// Last id used by any record.
    pub last_id: u64,
    pub species: SpeciesCounts,
}

/// Extra per-node data joined in the feature tables.
#[derive(Debug, Default)]
pub struct Additional {
    pub genomes: GenomeCounts,
    pub ages: Ages,
}

impl Additional {
    pub fn load(options: &BuildOptions) -> Result<Self> {
        let mut genomes = GenomeCounts::default();
        if options.genome_reports.is_empty() {
            tracing::warn!("no genome report given, genome counts will be 0");
        }
        for path in &options.genome_reports {
            tracing::info!(path = %path.display(), "reading genome report");
            genomes = genomes.merge(GenomeCounts::from_report(open(path)?, path)?);
        }

        let ages_path = options
            .ages
            .clone()
            .unwrap_or_else(|| options.taxonomy_dir.join(AGES_FILE));
        let ages = if ages_path.exists() {
            tracing::info!(path = %ages_path.display(), "reading ages");
            Ages::from_csv(open(&ages_path)?, &ages_path)?
        } else if options.ages.is_some() {
            return Err(BuildError::io(
                &ages_path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        } else {
            tracing::warn!(path = %ages_path.display(), "no ages file, ages will be null");
            Ages::default()
        };
        Ok(Self { genomes, ages })
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|err| BuildError::io(path, err))?;
    Ok(BufReader::new(file))
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|err| BuildError::io(path, err))
}

/// Reads the taxonomy and runs the full build, writing COPY files to
/// `<output>/db`.
pub fn build(options: &BuildOptions, config: &Config) -> Result<BuildReport> {
    create_dir(&options.output_dir)?;
    tracing::info!(dir = %options.taxonomy_dir.display(), "building taxonomy");
    let taxonomy = Taxonomy::load_dir(&options.taxonomy_dir, &config.languages)?;
    let mut sink = CopyFileSink::create(&options.db_dir(), config)?;
    build_with(&taxonomy, options, config, &mut sink)
}

/// Runs the build on an already loaded taxonomy. Records go to `sink`,
/// feature tables and metadata to `options.output_dir`.
pub fn build_with<S: RecordSink + ?Sized>(
    taxonomy: &Taxonomy,
    options: &BuildOptions,
    config: &Config,
    sink: &mut S,
) -> Result<BuildReport> {
    create_dir(&options.output_dir)?;
    let additional = if options.skip_add_info {
        tracing::info!("skipping additional info");
        None
    } else {
        Some(Additional::load(options)?)
    };

    let lang = config.primary_language();
    let mut ids = IdAllocator::starting_after(FIRST_ID);
    let mut groups = Vec::with_capacity(Group::ALL.len());
    let mut complete: Vec<CompleteRow> = Vec::new();
    let mut species = SpeciesCounts::default();

    for group in Group::ALL {
        tracing::info!(group = group.name(), start = ids.last(), "doing group");
        let mut tree = taxonomy.clade(group.root_taxid())?;
        let simplified = if config.simplify {
            let (smaller, stats) = simplify(&tree, lang);
            tree = smaller;
            Some(stats)
        } else {
            None
        };

        let anchor = config.layout.anchor(group);
        let layout = layout::layout_tree(&mut tree, &anchor, &mut ids, &config.layout)?;
        let synthesis = geometry::synthesize(&tree, group, &mut ids, config, &mut *sink)?;

        let features = export::feature_rows(&tree, config)?;
        export::write_json(&export::features_path(&options.output_dir, group), &features)?;
        let chains = aggregate::ascend_chains(&tree);
        let ascends = export::ascend_rows(&tree, &chains);
        export::write_json(&export::ascends_path(&options.output_dir, group), &ascends)?;

        let extra = additional.as_ref().map(|additional| {
            aggregate::additional_info(&tree, &chains, &additional.genomes, &additional.ages)
        });
        if let Some(rows) = &extra {
            export::write_json(&export::additional_path(&options.output_dir, group), rows)?;
        }
        complete.extend(export::complete_rows(&features, &ascends, extra.as_deref()));

        species.set(group, tree.leaf_count());
        tracing::info!(
            group = group.name(),
            last_id = ids.last(),
            max_zoom = layout.max_zoom,
            "group done"
        );
        groups.push(GroupReport {
            group,
            layout,
            synthesis,
            simplified,
        });
    }
    sink.finish()?;

    tracing::info!("writing merged features");
    export::write_json(&options.output_dir.join(export::COMPLETE_FILE), &complete)?;

    if options.skip_lmdata {
        tracing::info!("skipping lmdata export");
    } else {
        let dir = options.lmdata_dir();
        create_dir(&dir)?;
        let rows = export::lmdata_rows(&complete, config);
        export::write_json(&dir.join(export::LMDATA_FILE), &rows)?;
        export::write_timestamp(&dir.join(export::TIMESTAMP_FILE), chrono::Local::now())?;
    }

    let metadata = Metadata {
        update: export::taxdump_date(&options.taxonomy_dir)?,
        species,
    };
    export::write_json(&options.output_dir.join(export::METADATA_FILE), &metadata)?;
    tracing::info!(species = species.total, last_id = ids.last(), "build done");

    Ok(BuildReport {
        groups,
        last_id: ids.last(),
        species,
    })
}
