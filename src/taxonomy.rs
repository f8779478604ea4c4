//! Reading the NCBI taxonomy dump (`nodes.dmp`, `names.dmp`) and the optional
//! localisation tables into a forest, then cutting group trees out of it.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{BuildError, Result};
use crate::tree::{Localized, NodeId, TaxonInfo, TaxonTree};

/// Names matching this are dropped by [`simplify`], with their subtree.
static UNCERTAIN_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[Uu]nclassified|[Uu]ncultured|[Uu]nidentified|environmental|sp\.").unwrap()
});

pub const NODES_FILE: &str = "nodes.dmp";
pub const NAMES_FILE: &str = "names.dmp";

/// Every name of one taxon found in `names.dmp`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxonNames {
    pub sci_name: Option<String>,
    pub common_names: Vec<String>,
    pub authority: Vec<String>,
    pub synonym: Vec<String>,
}

/// One `nodes.dmp` row.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub taxid: String,
    pub parent: String,
    pub rank: String,
}

fn dump_fields(line: &str) -> Vec<&str> {
    let line = line.trim_end_matches(['\n', '\r']);
    let line = line.strip_suffix("\t|").unwrap_or(line);
    line.split('|').map(|field| field.trim_matches('\t')).collect()
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|err| BuildError::io(path, err))?;
    Ok(BufReader::new(file))
}

pub fn parse_names<R: BufRead>(reader: R, path: &Path) -> Result<HashMap<String, TaxonNames>> {
    let mut names: HashMap<String, TaxonNames> = HashMap::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| BuildError::io(path, err))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = dump_fields(&line);
        if fields.len() < 4 {
            return Err(BuildError::parse(path, idx + 1, "expected 4 fields"));
        }
        let entry = names.entry(fields[0].to_string()).or_default();
        let value = fields[1].to_string();
        match fields[3] {
            "scientific name" => entry.sci_name = Some(value),
            "common name" => entry.common_names.push(value),
            "authority" => entry.authority.push(value),
            "synonym" => entry.synonym.push(value),
            _ => {}
        }
    }
    Ok(names)
}

/// Parses `nodes.dmp`. The first row, the `1 | 1` self edge of the root, is
/// skipped.
pub fn parse_nodes<R: BufRead>(reader: R, path: &Path) -> Result<Vec<NodeRecord>> {
    let mut nodes = Vec::new();
    for (idx, line) in reader.lines().enumerate().skip(1) {
        let line = line.map_err(|err| BuildError::io(path, err))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = dump_fields(&line);
        if fields.len() < 3 {
            return Err(BuildError::parse(path, idx + 1, "expected at least 3 fields"));
        }
        nodes.push(NodeRecord {
            taxid: fields[0].to_string(),
            parent: fields[1].to_string(),
            rank: fields[2].to_string(),
        });
    }
    Ok(nodes)
}

/// Common names and rank names in languages other than the dump's own.
#[derive(Debug, Clone, Default)]
pub struct Translations {
    /// language -> scientific name -> common names
    common_names: HashMap<String, HashMap<String, Vec<String>>>,
    /// language -> English rank -> translated rank
    ranks: HashMap<String, HashMap<String, String>>,
}

impl Translations {
    /// Vernacular file of `lang`: `scientific name \t common name` rows.
    pub fn vernacular_file(lang: &str) -> String {
        format!("TAXONOMIC-VERNACULAR-{}.txt", lang.to_uppercase())
    }

    /// Rank file of `lang`: `english rank \t translated rank` rows.
    pub fn ranks_file(lang: &str) -> String {
        format!("ranks_{lang}.txt")
    }

    /// Loads whatever translation files exist in `dir` for `languages`.
    /// Missing files only log a warning.
    pub fn load_dir(dir: &Path, languages: &[String]) -> Result<Self> {
        let mut translations = Self::default();
        for lang in languages {
            let vernacular = dir.join(Self::vernacular_file(lang));
            if vernacular.exists() {
                translations.add_common_names(lang, open(&vernacular)?, &vernacular)?;
            } else {
                tracing::warn!(path = %vernacular.display(), "no vernacular names for {lang}");
            }
            let ranks = dir.join(Self::ranks_file(lang));
            if ranks.exists() {
                translations.add_ranks(lang, open(&ranks)?, &ranks)?;
            } else {
                tracing::warn!(path = %ranks.display(), "no rank translations for {lang}");
            }
        }
        Ok(translations)
    }

    pub fn add_common_names<R: BufRead>(
        &mut self,
        lang: &str,
        reader: R,
        path: &Path,
    ) -> Result<()> {
        let table = self.common_names.entry(lang.to_string()).or_default();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| BuildError::io(path, err))?;
            if line.trim().is_empty() {
                continue;
            }
            let Some((sci_name, common)) = line.split_once('\t') else {
                return Err(BuildError::parse(path, idx + 1, "expected a tab separated pair"));
            };
            table
                .entry(sci_name.trim().to_string())
                .or_default()
                .push(common.trim().to_string());
        }
        Ok(())
    }

    pub fn add_ranks<R: BufRead>(&mut self, lang: &str, reader: R, path: &Path) -> Result<()> {
        let table = self.ranks.entry(lang.to_string()).or_default();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| BuildError::io(path, err))?;
            if line.trim().is_empty() {
                continue;
            }
            let Some((rank, translated)) = line.split_once('\t') else {
                return Err(BuildError::parse(path, idx + 1, "expected a tab separated pair"));
            };
            table.insert(rank.trim().to_string(), translated.trim().to_string());
        }
        Ok(())
    }

    fn common_names(&self, lang: &str, sci_name: &str) -> &[String] {
        self.common_names
            .get(lang)
            .and_then(|table| table.get(sci_name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Ranks among `ranks` with no entry in the rank table of `lang`.
    pub fn untranslated_ranks<'a>(
        &self,
        lang: &str,
        ranks: impl IntoIterator<Item = &'a str>,
    ) -> BTreeSet<&'a str> {
        ranks
            .into_iter()
            .filter(|rank| !rank.is_empty() && self.rank(lang, rank).is_none())
            .collect()
    }

    fn rank(&self, lang: &str, rank: &str) -> Option<&str> {
        self.ranks
            .get(lang)
            .and_then(|table| table.get(rank))
            .map(String::as_str)
    }
}

fn short_and_long(names: &[String]) -> (String, String) {
    match names.first() {
        Some(first) => (format!("({first})"), format!("({})", names.join(", "))),
        None => (String::new(), String::new()),
    }
}

/// The whole NCBI forest, stored as an arena in first-appearance order.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    infos: Vec<TaxonInfo>,
    children: Vec<Vec<usize>>,
    index: HashMap<String, usize>,
}

impl Taxonomy {
    /// Reads `nodes.dmp`, `names.dmp` and the translation files of `dir`.
    pub fn load_dir(dir: &Path, languages: &[String]) -> Result<Self> {
        let names_path = dir.join(NAMES_FILE);
        let nodes_path = dir.join(NODES_FILE);
        tracing::info!(path = %names_path.display(), "reading names");
        let names = parse_names(open(&names_path)?, &names_path)?;
        tracing::info!(path = %nodes_path.display(), "reading nodes");
        let nodes = parse_nodes(open(&nodes_path)?, &nodes_path)?;
        let Some((_, others)) = languages.split_first() else {
            return Err(BuildError::Config {
                message: "no language configured".to_string(),
            });
        };
        let translations = Translations::load_dir(dir, others)?;
        Self::build(&nodes, &names, &translations, languages)
    }

    /// Builds the forest once every row is known. `languages[0]` is the
    /// language of the dump itself.
    pub fn build(
        nodes: &[NodeRecord],
        names: &HashMap<String, TaxonNames>,
        translations: &Translations,
        languages: &[String],
    ) -> Result<Self> {
        fn slot(taxid: &str, index: &mut HashMap<String, usize>, order: &mut Vec<String>) -> usize {
            if let Some(idx) = index.get(taxid) {
                return *idx;
            }
            let idx = order.len();
            index.insert(taxid.to_string(), idx);
            order.push(taxid.to_string());
            idx
        }

        let mut index: HashMap<String, usize> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut edges = Vec::with_capacity(nodes.len());
        for record in nodes {
            let parent = slot(&record.parent, &mut index, &mut order);
            let child = slot(&record.taxid, &mut index, &mut order);
            edges.push((parent, child, record.rank.as_str()));
        }

        let mut ranks: Vec<Option<&str>> = vec![None; order.len()];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); order.len()];
        let mut has_parent = vec![false; order.len()];
        for (parent, child, rank) in edges {
            if parent == child {
                continue;
            }
            if has_parent[child] {
                return Err(BuildError::parse(
                    NODES_FILE,
                    0,
                    format!("taxon {} listed twice", order[child]),
                ));
            }
            has_parent[child] = true;
            ranks[child] = Some(rank);
            children[parent].push(child);
        }

        let primary = languages.first().map(String::as_str).unwrap_or("en");
        for lang in languages.iter().filter(|lang| lang.as_str() != primary) {
            let missing = translations.untranslated_ranks(lang, ranks.iter().flatten().copied());
            if !missing.is_empty() {
                let missing: Vec<&str> = missing.into_iter().collect();
                tracing::warn!(
                    count = missing.len(),
                    "ranks without {lang} translation, English kept: {}",
                    missing.join(", ")
                );
            }
        }

        let mut infos = Vec::with_capacity(order.len());
        for (idx, taxid) in order.iter().enumerate() {
            let entry = names.get(taxid.as_str());
            let sci_name = entry
                .and_then(|names| names.sci_name.clone())
                .ok_or_else(|| BuildError::MissingName {
                    taxid: taxid.to_string(),
                })?;

            let mut rank = Localized::new();
            let mut common_name = Localized::new();
            let mut common_name_long = Localized::new();
            let rank_en = ranks[idx].unwrap_or("");
            for lang in languages {
                let commons: &[String] = if lang == primary {
                    entry.map(|names| names.common_names.as_slice()).unwrap_or(&[])
                } else {
                    translations.common_names(lang, &sci_name)
                };
                let (short, long) = short_and_long(commons);
                common_name.insert(lang.clone(), short);
                common_name_long.insert(lang.clone(), long);
                let localized_rank = if lang == primary {
                    rank_en
                } else {
                    translations.rank(lang, rank_en).unwrap_or(rank_en)
                };
                rank.insert(lang.clone(), localized_rank.to_string());
            }

            infos.push(TaxonInfo {
                taxid: taxid.to_string(),
                sci_name,
                rank,
                common_name,
                common_name_long,
                authority: entry.map(|names| names.authority.join(", ")).unwrap_or_default(),
                synonym: entry.map(|names| names.synonym.join(", ")).unwrap_or_default(),
            });
        }

        tracing::info!(taxa = infos.len(), "taxonomy built");
        Ok(Self {
            infos,
            children,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn get(&self, taxid: &str) -> Option<&TaxonInfo> {
        self.index.get(taxid).map(|idx| &self.infos[*idx])
    }

    /// Copies the subtree rooted at `taxid` into its own tree, laid out in
    /// level order.
    pub fn clade(&self, taxid: &str) -> Result<TaxonTree> {
        let root = *self.index.get(taxid).ok_or_else(|| BuildError::MissingTaxon {
            taxid: taxid.to_string(),
        })?;
        let mut tree = TaxonTree::new(self.infos[root].clone());
        let mut queue: VecDeque<(usize, NodeId)> = VecDeque::from([(root, tree.root())]);
        while let Some((source, target)) = queue.pop_front() {
            for child in &self.children[source] {
                let id = tree.add_child(target, self.infos[*child].clone());
                queue.push_back((*child, id));
            }
        }
        Ok(tree)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimplifyStats {
    pub tips_before: usize,
    pub tips_after: usize,
}

/// Removes tips without rank and every taxon whose name marks it as
/// unclassified, uncultured, unidentified, environmental or an unnamed
/// species, with its subtree. A single pass: a parent left without children
/// stays.
pub fn simplify(tree: &TaxonTree, lang: &str) -> (TaxonTree, SimplifyStats) {
    let drop = |id: NodeId| {
        let info = tree.info(id);
        (tree.is_leaf(id) && info.rank_in(lang) == "no rank")
            || UNCERTAIN_NAME_RE.is_match(&info.sci_name)
    };

    let mut simplified = TaxonTree::new(tree.info(tree.root()).clone());
    let mut queue: VecDeque<(NodeId, NodeId)> = VecDeque::from([(tree.root(), simplified.root())]);
    while let Some((source, target)) = queue.pop_front() {
        for child in tree.children(source) {
            if drop(*child) {
                continue;
            }
            let id = simplified.add_child(target, tree.info(*child).clone());
            queue.push_back((*child, id));
        }
    }

    let stats = SimplifyStats {
        tips_before: tree.leaf_count(),
        tips_after: simplified.leaf_count(),
    };
    let removed = stats.tips_before.saturating_sub(stats.tips_after);
    tracing::info!(
        removed,
        percent = format!("{:.2}", removed as f64 / stats.tips_before.max(1) as f64 * 100.0),
        final_size = stats.tips_after,
        "tree simplified"
    );
    (simplified, stats)
}
