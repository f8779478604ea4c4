use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use serde::Serialize;

use crate::error::{BuildError, Result};
use crate::tree::TaxonTree;

/// Taxid closing every ancestor chain; stands for LUCA.
pub const ASCEND_SENTINEL: &str = "0";

/// For each node (indexed by `NodeId`), the taxids of its ancestors from the
/// parent up to the root, followed by [`ASCEND_SENTINEL`].
pub fn ascend_chains(tree: &TaxonTree) -> Vec<Vec<String>> {
    let mut chains = vec![Vec::new(); tree.len()];
    for id in tree.level_order() {
        let mut chain: Vec<String> = tree
            .ancestors(id)
            .map(|ancestor| tree.info(ancestor).taxid.clone())
            .collect();
        chain.push(ASCEND_SENTINEL.to_string());
        chains[id] = chain;
    }
    chains
}

/// Complete genomes per taxid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenomeCounts {
    counts: HashMap<String, u64>,
}

impl GenomeCounts {
    /// Reads an NCBI `GENOME_REPORTS` table (`eukaryotes.txt`,
    /// `prokaryotes.txt`): tab separated, one header row, `-` for missing
    /// values. Only `Complete Genome` rows count.
    pub fn from_report<R: BufRead>(reader: R, path: &Path) -> Result<Self> {
        let mut lines = reader.lines().enumerate();
        let header = match lines.next() {
            Some((_, line)) => line.map_err(|err| BuildError::io(path, err))?,
            None => return Ok(Self::default()),
        };
        let columns: Vec<&str> = header.trim_start_matches('#').split('\t').collect();
        let column = |name: &str| {
            columns
                .iter()
                .position(|column| column.trim() == name)
                .ok_or_else(|| BuildError::parse(path, 1, format!("missing column {name}")))
        };
        let taxid_col = column("TaxID")?;
        let status_col = column("Status")?;

        let mut counts: HashMap<String, u64> = HashMap::new();
        for (_, line) in lines {
            let line = line.map_err(|err| BuildError::io(path, err))?;
            let fields: Vec<&str> = line.split('\t').collect();
            let (Some(taxid), Some(status)) = (fields.get(taxid_col), fields.get(status_col)) else {
                continue;
            };
            let taxid = taxid.trim();
            if taxid == "-" || taxid.is_empty() || status.trim() != "Complete Genome" {
                continue;
            }
            *counts.entry(taxid.to_string()).or_default() += 1;
        }
        Ok(Self { counts })
    }

    pub fn merge(mut self, other: GenomeCounts) -> Self {
        for (taxid, n) in other.counts {
            *self.counts.entry(taxid).or_default() += n;
        }
        self
    }

    pub fn get(&self, taxid: &str) -> u64 {
        self.counts.get(taxid).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Divergence ages in million years, from a TimeTree `node,age` CSV.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ages {
    ages: HashMap<String, f64>,
}

impl Ages {
    pub fn from_csv<R: BufRead>(reader: R, path: &Path) -> Result<Self> {
        let mut lines = reader.lines().enumerate();
        let header = match lines.next() {
            Some((_, line)) => line.map_err(|err| BuildError::io(path, err))?,
            None => return Ok(Self::default()),
        };
        let columns: Vec<&str> = header.split(',').map(|c| c.trim().trim_matches('"')).collect();
        let position = |name: &str| {
            columns
                .iter()
                .position(|column| *column == name)
                .ok_or_else(|| BuildError::parse(path, 1, format!("missing column {name}")))
        };
        let node_col = position("node")?;
        let age_col = position("age")?;

        let mut ages = HashMap::new();
        for (idx, line) in lines {
            let line = line.map_err(|err| BuildError::io(path, err))?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(|f| f.trim().trim_matches('"')).collect();
            let (Some(node), Some(age)) = (fields.get(node_col), fields.get(age_col)) else {
                return Err(BuildError::parse(path, idx + 1, "missing node or age"));
            };
            if age.is_empty() || *age == "NA" {
                continue;
            }
            let age: f64 = age
                .parse()
                .map_err(|_| BuildError::parse(path, idx + 1, format!("invalid age {age:?}")))?;
            ages.insert(node.to_string(), age);
        }
        Ok(Self { ages })
    }

    pub fn get(&self, taxid: &str) -> Option<f64> {
        self.ages.get(taxid).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdditionalInfo {
    pub taxid: String,
    pub ascend: Vec<String>,
    /// Complete genomes of the taxon and all its descendants.
    pub genomes: u64,
    pub age: Option<f64>,
}

/// Joins genome counts and ages onto every node, in level order.
pub fn additional_info(
    tree: &TaxonTree,
    chains: &[Vec<String>],
    genomes: &GenomeCounts,
    ages: &Ages,
) -> Vec<AdditionalInfo> {
    let order = tree.level_order();
    let mut totals: Vec<u64> = (0..tree.len())
        .map(|id| genomes.get(&tree.info(id).taxid))
        .collect();
    for id in order.iter().rev() {
        if let Some(parent) = tree.parent(*id) {
            totals[parent] += totals[*id];
        }
    }

    order
        .into_iter()
        .map(|id| {
            let taxid = &tree.info(id).taxid;
            AdditionalInfo {
                taxid: taxid.clone(),
                ascend: chains.get(id).cloned().unwrap_or_default(),
                genomes: totals[id],
                age: ages.get(taxid),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TaxonInfo;
    use std::io::Cursor;

    fn sample() -> TaxonTree {
        // 2759 -> (33154 -> 9606, 33090)
        let mut tree = TaxonTree::new(TaxonInfo::new("2759", "Eukaryota"));
        let opis = tree.add_child(0, TaxonInfo::new("33154", "Opisthokonta"));
        tree.add_child(0, TaxonInfo::new("33090", "Viridiplantae"));
        tree.add_child(opis, TaxonInfo::new("9606", "Homo sapiens"));
        tree
    }

    #[test]
    fn chains_end_with_the_sentinel() {
        let tree = sample();
        let chains = ascend_chains(&tree);
        assert_eq!(chains[0], vec!["0"]);
        assert_eq!(chains[3], vec!["33154", "2759", "0"]);
        for id in 0..tree.len() {
            assert_eq!(chains[id].len(), tree.depth(id) + 1);
        }
    }

    #[test]
    fn counts_only_complete_genomes() {
        let report = "\
#Organism/Name\tTaxID\tBioProject\tStatus
Homo sapiens\t9606\tPRJNA1\tComplete Genome
Homo sapiens\t9606\tPRJNA2\tChromosome
Homo sapiens\t9606\tPRJNA3\tComplete Genome
Arabidopsis\t33090\tPRJNA4\tComplete Genome
Unknown\t-\tPRJNA5\tComplete Genome
";
        let counts =
            GenomeCounts::from_report(Cursor::new(report), Path::new("eukaryotes.txt")).unwrap();
        assert_eq!(counts.get("9606"), 2);
        assert_eq!(counts.get("33090"), 1);
        assert_eq!(counts.get("-"), 0);

        let more = GenomeCounts::from_report(
            Cursor::new("TaxID\tStatus\n9606\tComplete Genome\n"),
            Path::new("prokaryotes.txt"),
        )
        .unwrap();
        assert_eq!(counts.merge(more).get("9606"), 3);
    }

    #[test]
    fn report_without_status_column_is_rejected() {
        let err = GenomeCounts::from_report(Cursor::new("TaxID\tName\n"), Path::new("x.txt"));
        assert!(matches!(err, Err(BuildError::Parse { line: 1, .. })));
    }

    #[test]
    fn reads_ages_ignoring_extra_columns() {
        let csv = "node,age,ci\n9606,0.0,x\n2759,1480.5,y\n33090,,z\n";
        let ages = Ages::from_csv(Cursor::new(csv), Path::new("timetreetimes.csv")).unwrap();
        assert_eq!(ages.get("2759"), Some(1480.5));
        assert_eq!(ages.get("33090"), None);
        assert!(Ages::from_csv(Cursor::new("node,age\n1,old\n"), Path::new("t.csv")).is_err());
    }

    #[test]
    fn genome_totals_include_descendants() {
        let tree = sample();
        let chains = ascend_chains(&tree);
        let genomes = GenomeCounts::from_report(
            Cursor::new(
                "TaxID\tStatus\n9606\tComplete Genome\n33154\tComplete Genome\n33090\tComplete Genome\n",
            ),
            Path::new("g.txt"),
        )
        .unwrap();
        let ages =
            Ages::from_csv(Cursor::new("node,age\n2759,1480\n"), Path::new("a.csv")).unwrap();
        let rows = additional_info(&tree, &chains, &genomes, &ages);
        let by_taxid: HashMap<&str, &AdditionalInfo> =
            rows.iter().map(|row| (row.taxid.as_str(), row)).collect();
        assert_eq!(by_taxid["2759"].genomes, 3);
        assert_eq!(by_taxid["33154"].genomes, 2);
        assert_eq!(by_taxid["9606"].genomes, 1);
        assert_eq!(by_taxid["2759"].age, Some(1480.0));
        assert_eq!(by_taxid["9606"].age, None);
        assert_eq!(by_taxid["9606"].ascend, vec!["33154", "2759", "0"]);
    }
}
