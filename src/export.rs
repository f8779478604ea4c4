//! Flat feature tables (JSON) read by the search index and the client
//! libraries, plus build metadata.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::aggregate::AdditionalInfo;
use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::layout::Group;
use crate::tree::TaxonTree;

pub fn features_path(dir: &Path, group: Group) -> PathBuf {
    dir.join(format!("TreeFeatures{}.json", group.number()))
}

pub fn ascends_path(dir: &Path, group: Group) -> PathBuf {
    dir.join(format!("ascends_{}.json", group.number()))
}

pub fn additional_path(dir: &Path, group: Group) -> PathBuf {
    dir.join(format!("ADDITIONAL.{}.json", group.number()))
}

pub const COMPLETE_FILE: &str = "TreeFeaturesComplete.json";
pub const LMDATA_FILE: &str = "lmdata.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const TIMESTAMP_FILE: &str = "timestamp.txt";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub taxid: String,
    pub sci_name: String,
    pub suggest_weight: String,
    /// `common_name_{lang}`, `rank_{lang}` and `all_{lang}` for every
    /// configured language.
    #[serde(flatten)]
    pub localized: BTreeMap<String, String>,
    pub authority: String,
    pub synonym: String,
    pub zoom: i32,
    pub nbdesc: usize,
    /// `[lat, lon]`
    pub coordinates: [f64; 2],
    pub lat: f64,
    pub lon: f64,
}

/// One feature row per node, in level order.
pub fn feature_rows(tree: &TaxonTree, config: &Config) -> Result<Vec<FeatureRow>> {
    let export = &config.export;
    let mut rows = Vec::with_capacity(tree.len());
    for id in tree.level_order() {
        let placed = tree.placed(id)?;
        let info = tree.info(id);

        let mut localized = BTreeMap::new();
        for lang in &config.languages {
            let common = info.common_name_long_in(lang);
            let rank = info.rank_in(lang);
            localized.insert(
                format!("all_{lang}"),
                format!("{} | {} | {} | {}", info.sci_name, common, rank, info.taxid),
            );
            localized.insert(format!("common_name_{lang}"), common.to_string());
            localized.insert(format!("rank_{lang}"), rank.to_string());
        }

        let weight = export.suggest_weight_base - info.sci_name.chars().count() as i64;
        rows.push(FeatureRow {
            taxid: info.taxid.clone(),
            sci_name: info.sci_name.clone(),
            suggest_weight: weight.to_string(),
            localized,
            authority: info.authority.clone(),
            synonym: info.synonym.clone(),
            zoom: placed.zoom.saturating_add(export.zoom_offset),
            nbdesc: placed.leaf_count,
            coordinates: [placed.y, placed.x],
            lat: placed.y,
            lon: placed.x,
        });
    }
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AscendRow {
    pub taxid: String,
    pub ascend: Vec<String>,
}

pub fn ascend_rows(tree: &TaxonTree, chains: &[Vec<String>]) -> Vec<AscendRow> {
    tree.level_order()
        .into_iter()
        .map(|id| AscendRow {
            taxid: tree.info(id).taxid.clone(),
            ascend: chains.get(id).cloned().unwrap_or_default(),
        })
        .collect()
}

/// A feature row joined with its ancestor chain and additional data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteRow {
    pub taxid: String,
    pub sci_name: String,
    pub zoom: i32,
    pub lat: f64,
    pub lon: f64,
    pub ascend: Vec<String>,
    pub genomes: Option<u64>,
    pub age: Option<f64>,
}

/// Left join of `features` with `ascends` and `additional` on taxid.
pub fn complete_rows(
    features: &[FeatureRow],
    ascends: &[AscendRow],
    additional: Option<&[AdditionalInfo]>,
) -> Vec<CompleteRow> {
    let ascends: HashMap<&str, &AscendRow> =
        ascends.iter().map(|row| (row.taxid.as_str(), row)).collect();
    let additional: HashMap<&str, &AdditionalInfo> = additional
        .unwrap_or_default()
        .iter()
        .map(|row| (row.taxid.as_str(), row))
        .collect();

    features
        .iter()
        .map(|feature| {
            let extra = additional.get(feature.taxid.as_str());
            CompleteRow {
                taxid: feature.taxid.clone(),
                sci_name: feature.sci_name.clone(),
                zoom: feature.zoom,
                lat: feature.lat,
                lon: feature.lon,
                ascend: ascends
                    .get(feature.taxid.as_str())
                    .map(|row| row.ascend.clone())
                    .unwrap_or_default(),
                genomes: extra.map(|row| row.genomes),
                age: extra.and_then(|row| row.age),
            }
        })
        .collect()
}

/// Row of the table shipped to the client libraries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmDataRow {
    pub taxid: String,
    #[serde(rename = "pylifemap_zoom")]
    pub zoom: i32,
    #[serde(rename = "pylifemap_x")]
    pub x: f64,
    #[serde(rename = "pylifemap_y")]
    pub y: f64,
    #[serde(rename = "pylifemap_ascend")]
    pub ascend: Vec<String>,
    #[serde(rename = "pylifemap_leaf")]
    pub leaf: bool,
    #[serde(rename = "pylifemap_parent")]
    pub parent: Option<String>,
}

/// The merged rows of all groups plus a LUCA row. A row is a leaf when no
/// other row names it as parent.
pub fn lmdata_rows(complete: &[CompleteRow], config: &Config) -> Vec<LmDataRow> {
    let luca = CompleteRow {
        taxid: crate::aggregate::ASCEND_SENTINEL.to_string(),
        sci_name: "Luca".to_string(),
        zoom: config.export.luca_zoom,
        lat: config.layout.luca_y,
        lon: config.layout.luca_x,
        ascend: Vec::new(),
        genomes: None,
        age: None,
    };

    let parents: HashSet<&str> = complete
        .iter()
        .filter_map(|row| row.ascend.first().map(String::as_str))
        .collect();

    complete
        .iter()
        .chain(std::iter::once(&luca))
        .map(|row| LmDataRow {
            taxid: row.taxid.clone(),
            zoom: row.zoom,
            x: row.lon,
            y: row.lat,
            ascend: row.ascend.clone(),
            leaf: !parents.contains(row.taxid.as_str()),
            parent: row.ascend.first().cloned(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesCounts {
    pub archaea: usize,
    pub eukaryotes: usize,
    pub bacteria: usize,
    pub total: usize,
}

impl SpeciesCounts {
    pub fn set(&mut self, group: Group, count: usize) {
        match group {
            Group::Archaea => self.archaea = count,
            Group::Eukaryotes => self.eukaryotes = count,
            Group::Bacteria => self.bacteria = count,
        }
        self.total = self.archaea + self.eukaryotes + self.bacteria;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Date of the taxonomy dump, `YYYY-MM-DD`.
    pub update: String,
    pub species: SpeciesCounts,
}

/// Date of the taxonomy dump in `dir`: the archive's modification time when
/// it is there, else that of `nodes.dmp`.
pub fn taxdump_date(dir: &Path) -> Result<String> {
    let archive = dir.join("taxdump.tar.gz");
    let path = if archive.exists() {
        archive
    } else {
        dir.join(crate::taxonomy::NODES_FILE)
    };
    let modified = std::fs::metadata(&path)
        .and_then(|meta| meta.modified())
        .map_err(|err| BuildError::io(&path, err))?;
    Ok(format_date(modified))
}

pub fn format_date(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%Y-%m-%d").to_string()
}

/// Build time as `YYYYMMDDHHMM`.
pub fn timestamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d%H%M").to_string()
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|err| BuildError::io(path, err))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush().map_err(|err| BuildError::io(path, err))
}

pub fn write_timestamp(path: &Path, now: DateTime<Local>) -> Result<()> {
    std::fs::write(path, timestamp(now)).map_err(|err| BuildError::io(path, err))
}
