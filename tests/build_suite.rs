use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use lifemap_builder::config::Config;
use lifemap_builder::geometry::GeometryRecord;
use lifemap_builder::sink::MemorySink;
use lifemap_builder::taxonomy::Taxonomy;
use lifemap_builder::{BuildError, BuildOptions, build, build_with};
use serde_json::Value;

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn options(output: &Path) -> BuildOptions {
    let root = fixtures();
    BuildOptions {
        taxonomy_dir: root.join("taxdump"),
        output_dir: output.to_path_buf(),
        genome_reports: vec![root.join("eukaryotes.txt"), root.join("prokaryotes.txt")],
        ages: None,
        skip_add_info: false,
        skip_lmdata: false,
    }
}

fn read_json(path: &Path) -> Value {
    let text = std::fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("{}: {err}", path.display()));
    serde_json::from_str(&text).expect("invalid json")
}

fn rows_by_taxid(value: &Value) -> HashMap<String, Value> {
    value
        .as_array()
        .expect("array")
        .iter()
        .map(|row| (row["taxid"].as_str().expect("taxid").to_string(), row.clone()))
        .collect()
}

fn memory_build(config: &Config) -> (MemorySink, lifemap_builder::BuildReport, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let options = options(dir.path());
    let taxonomy = Taxonomy::load_dir(&options.taxonomy_dir, &config.languages).unwrap();
    let mut sink = MemorySink::default();
    let report = build_with(&taxonomy, &options, config, &mut sink).unwrap();
    (sink, report, dir)
}

#[test]
fn builds_every_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let report = build(&options(dir.path()), &Config::default()).unwrap();
    assert_eq!(report.groups.len(), 3);

    let out = dir.path();
    let expected = [
        "TreeFeatures1.json",
        "TreeFeatures2.json",
        "TreeFeatures3.json",
        "ascends_1.json",
        "ascends_2.json",
        "ascends_3.json",
        "ADDITIONAL.1.json",
        "ADDITIONAL.2.json",
        "ADDITIONAL.3.json",
        "TreeFeaturesComplete.json",
        "metadata.json",
        "lmdata/lmdata.json",
        "lmdata/timestamp.txt",
        "db/points.tsv",
        "db/branches.tsv",
        "db/polygons.tsv",
        "db/cladecenters.tsv",
        "db/ranks.tsv",
        "db/load.sql",
    ];
    for file in expected {
        assert!(out.join(file).is_file(), "missing {file}");
    }

    let metadata = read_json(&out.join("metadata.json"));
    assert_eq!(metadata["species"]["archaea"], 2);
    assert_eq!(metadata["species"]["eukaryotes"], 5);
    assert_eq!(metadata["species"]["bacteria"], 4);
    assert_eq!(metadata["species"]["total"], 11);
    assert_eq!(metadata["update"].as_str().unwrap().len(), 10);

    let timestamp = std::fs::read_to_string(out.join("lmdata/timestamp.txt")).unwrap();
    assert_eq!(timestamp.len(), 12);
    assert!(timestamp.chars().all(|c| c.is_ascii_digit()));

    // One point row per node plus the global root.
    let points = std::fs::read_to_string(out.join("db/points.tsv")).unwrap();
    assert_eq!(points.lines().count(), 7 + 8 + 11 + 1);
}

#[test]
fn ids_are_unique_and_chained_across_groups() {
    let (sink, report, _dir) = memory_build(&Config::default());
    let mut seen = HashSet::new();
    for record in &sink.records {
        assert!(seen.insert(record.id()), "duplicate id {}", record.id());
    }
    assert_eq!(seen.iter().max().copied(), Some(report.last_id));

    let points: HashMap<&str, u64> = sink
        .points()
        .map(|point| (point.taxid.as_str(), point.id))
        .collect();
    // Archaea: leaves 2 and 3, then the five internal nodes.
    assert_eq!(points["2192"], 2);
    assert_eq!(points["2287"], 3);
    assert_eq!(points["2157"], 4);
    assert_eq!(report.groups[0].layout.last_point_id, 8);

    let archaea_max = sink
        .records
        .iter()
        .filter(|record| match record {
            GeometryRecord::Point(p) => p.group == 1,
            GeometryRecord::Branch(b) => b.group == 1,
            GeometryRecord::Polygon(p) => p.group == 1,
            GeometryRecord::CladeCenter(c) => c.group == 1,
            GeometryRecord::Rank(r) => r.group == 1,
        })
        .map(GeometryRecord::id)
        .max()
        .unwrap();
    // 6 branches, 5 clade blocks of 63 and the LUCA branch after the points.
    assert_eq!(archaea_max, 8 + 6 + 5 * 63 + 1);
    assert_eq!(points["2759"], archaea_max + 5 + 1);
}

#[test]
fn clade_records_share_a_block() {
    let (sink, _report, _dir) = memory_build(&Config::default());
    let polygons: HashMap<&str, u64> = sink
        .polygons()
        .map(|polygon| (polygon.taxid.as_str(), polygon.id))
        .collect();
    let centers: HashMap<&str, u64> = sink
        .clade_centers()
        .map(|center| (center.taxid.as_str(), center.id))
        .collect();
    let ranks: HashMap<&str, u64> = sink
        .ranks()
        .map(|rank| (rank.taxid.as_str(), rank.id))
        .collect();

    // Archaea root: its block follows the point ids 2..=8.
    assert_eq!(polygons["2157"], 8 + 61);
    for (taxid, polygon) in &polygons {
        assert_eq!(centers[taxid], polygon + 1);
        assert_eq!(ranks[taxid], polygon + 2);
    }
    // Leaves have no clade.
    assert!(!polygons.contains_key("9606"));
    assert_eq!(polygons.len(), 5 + 3 + 7);
    for polygon in sink.polygons() {
        assert!(polygon.geom.starts_with("POLYGON(("));
    }
}

#[test]
fn branches_are_named_left_to_right() {
    let (sink, _report, _dir) = memory_build(&Config::default());
    let named: Vec<&str> = sink.branches().filter_map(|branch| branch.name.as_deref()).collect();
    assert_eq!(named.len(), 6 + 7 + 10);
    assert!(
        named
            .iter()
            .any(|name| name.contains("Homo sapiens (human)") && name.contains("Opisthokonta"))
    );
    for name in named {
        assert!(name.starts_with("\u{2190}  "), "{name}");
        assert!(name.ends_with("  \u{2192}"), "{name}");
    }
    // One unnamed LUCA branch per group, at the configured zoom.
    let luca: Vec<_> = sink.branches().filter(|branch| branch.name.is_none()).collect();
    assert_eq!(luca.len(), 3);
    assert!(luca.iter().all(|branch| branch.zoom == 4));
}

#[test]
fn feature_tables_carry_translations_and_joins() {
    let dir = tempfile::tempdir().unwrap();
    build(&options(dir.path()), &Config::default()).unwrap();
    let out = dir.path();

    let eukaryotes = rows_by_taxid(&read_json(&out.join("TreeFeatures2.json")));
    let human = &eukaryotes["9606"];
    assert_eq!(human["sci_name"], "Homo sapiens");
    assert_eq!(human["suggest_weight"], "288");
    assert_eq!(human["common_name_en"], "(human)");
    assert_eq!(human["common_name_fr"], "(Homme, être humain)");
    assert_eq!(human["rank_fr"], "espèce");
    assert_eq!(human["all_en"], "Homo sapiens | (human) | species | 9606");
    assert_eq!(human["authority"], "Homo sapiens Linnaeus, 1758");
    assert_eq!(human["nbdesc"], 1);
    assert_eq!(human["coordinates"][0], human["lat"]);
    assert_eq!(human["coordinates"][1], human["lon"]);
    // Untranslated rank falls back to English.
    assert_eq!(eukaryotes["33154"]["rank_fr"], "clade");

    let bacteria = rows_by_taxid(&read_json(&out.join("TreeFeatures3.json")));
    assert_eq!(bacteria["562"]["synonym"], "Bacillus coli, Bacterium coli");
    assert_eq!(bacteria["2"]["nbdesc"], 4);

    let additional = rows_by_taxid(&read_json(&out.join("ADDITIONAL.2.json")));
    assert_eq!(additional["2759"]["genomes"], 3);
    assert_eq!(additional["33154"]["genomes"], 3);
    assert_eq!(additional["33090"]["genomes"], 0);
    assert_eq!(additional["2759"]["age"], 1850.5);
    assert!(additional["9606"]["age"].is_null());
    assert_eq!(additional["9606"]["ascend"], serde_json::json!(["33154", "2759", "0"]));

    let bacteria_extra = rows_by_taxid(&read_json(&out.join("ADDITIONAL.3.json")));
    assert_eq!(bacteria_extra["2"]["genomes"], 3);
    assert_eq!(bacteria_extra["561"]["genomes"], 2);

    let complete = read_json(&out.join("TreeFeaturesComplete.json"));
    assert_eq!(complete.as_array().unwrap().len(), 26);
    let complete = rows_by_taxid(&complete);
    assert_eq!(complete["562"]["ascend"], serde_json::json!(["561", "1236", "1224", "2", "0"]));
    assert_eq!(complete["562"]["zoom"], bacteria["562"]["zoom"]);
}

#[test]
fn lmdata_links_every_row_to_its_parent() {
    let dir = tempfile::tempdir().unwrap();
    build(&options(dir.path()), &Config::default()).unwrap();
    let rows = read_json(&dir.path().join("lmdata/lmdata.json"));
    let rows = rows_by_taxid(&rows);
    assert_eq!(rows.len(), 27);

    let luca = &rows["0"];
    assert_eq!(luca["pylifemap_zoom"], 5);
    assert!(luca["pylifemap_parent"].is_null());
    assert_eq!(luca["pylifemap_leaf"], false);

    for root in ["2157", "2759", "2"] {
        assert_eq!(rows[root]["pylifemap_parent"], "0");
        assert_eq!(rows[root]["pylifemap_leaf"], false);
    }
    assert_eq!(rows["9606"]["pylifemap_leaf"], true);
    assert_eq!(rows["9606"]["pylifemap_parent"], "33154");
}

#[test]
fn simplify_removes_uncertain_taxa() {
    let config = Config {
        simplify: true,
        ..Config::default()
    };
    let (sink, report, _dir) = memory_build(&config);
    let taxids: HashSet<&str> = sink.points().map(|point| point.taxid.as_str()).collect();
    assert!(!taxids.contains("48479"));
    assert!(!taxids.contains("77133"));
    assert!(!taxids.contains("2611352"));
    assert!(taxids.contains("9606"));
    assert_eq!(report.species.bacteria, 3);
    assert_eq!(report.species.eukaryotes, 4);
    assert_eq!(report.species.total, 9);
    let stats = report.groups[2].simplified.unwrap();
    assert_eq!((stats.tips_before, stats.tips_after), (4, 3));
}

#[test]
fn skip_flags_leave_optional_outputs_out() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = options(dir.path());
    options.skip_add_info = true;
    options.skip_lmdata = true;
    let taxonomy = Taxonomy::load_dir(&options.taxonomy_dir, &["en".to_string()]).unwrap();
    let config = Config {
        languages: vec!["en".to_string()],
        ..Config::default()
    };
    build_with(&taxonomy, &options, &config, &mut MemorySink::default()).unwrap();
    assert!(!dir.path().join("ADDITIONAL.1.json").exists());
    assert!(!dir.path().join("lmdata").exists());
    let complete = rows_by_taxid(&read_json(&dir.path().join("TreeFeaturesComplete.json")));
    assert!(complete["2759"]["genomes"].is_null());
    let features = rows_by_taxid(&read_json(&dir.path().join("TreeFeatures2.json")));
    assert!(features["9606"].get("common_name_fr").is_none());
}

#[test]
fn missing_scientific_name_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let source = fixtures().join("taxdump");
    std::fs::copy(source.join("nodes.dmp"), dir.path().join("nodes.dmp")).unwrap();
    let names = std::fs::read_to_string(source.join("names.dmp")).unwrap();
    let names: String = names
        .lines()
        .filter(|line| !line.starts_with("9598\t"))
        .map(|line| format!("{line}\n"))
        .collect();
    std::fs::write(dir.path().join("names.dmp"), names).unwrap();

    let err = Taxonomy::load_dir(dir.path(), &["en".to_string()]).unwrap_err();
    assert!(matches!(err, BuildError::MissingName { ref taxid } if taxid == "9598"));
}
