//! Where geometry records go. The database loader itself is external; this
//! crate writes what it bulk-loads.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::geo::{self, Point};
use crate::geometry::{
    BranchRecord, CladeCenterRecord, GeometryRecord, PointRecord, PolygonRecord, RankRecord,
};

/// Id of the global root point shared by the three groups.
pub const ROOT_POINT_ID: u64 = 1_000_000_000;

pub trait RecordSink {
    fn write(&mut self, record: GeometryRecord) -> Result<()>;

    /// Flushes buffered output. Called once, after the last group.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps every record in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<GeometryRecord>,
}

impl MemorySink {
    pub fn points(&self) -> impl Iterator<Item = &PointRecord> {
        self.records.iter().filter_map(|r| match r {
            GeometryRecord::Point(p) => Some(p),
            _ => None,
        })
    }

    pub fn branches(&self) -> impl Iterator<Item = &BranchRecord> {
        self.records.iter().filter_map(|r| match r {
            GeometryRecord::Branch(b) => Some(b),
            _ => None,
        })
    }

    pub fn polygons(&self) -> impl Iterator<Item = &PolygonRecord> {
        self.records.iter().filter_map(|r| match r {
            GeometryRecord::Polygon(p) => Some(p),
            _ => None,
        })
    }

    pub fn clade_centers(&self) -> impl Iterator<Item = &CladeCenterRecord> {
        self.records.iter().filter_map(|r| match r {
            GeometryRecord::CladeCenter(c) => Some(c),
            _ => None,
        })
    }

    pub fn ranks(&self) -> impl Iterator<Item = &RankRecord> {
        self.records.iter().filter_map(|r| match r {
            GeometryRecord::Rank(r) => Some(r),
            _ => None,
        })
    }
}

impl RecordSink for MemorySink {
    fn write(&mut self, record: GeometryRecord) -> Result<()> {
        self.records.push(record);
        Ok(())
    }
}

struct Table {
    name: &'static str,
    columns: Vec<String>,
    out: BufWriter<File>,
}

impl Table {
    fn create(dir: &Path, name: &'static str, columns: Vec<String>) -> Result<Self> {
        let path = dir.join(format!("{name}.tsv"));
        let file = File::create(&path).map_err(|err| BuildError::io(&path, err))?;
        Ok(Self {
            name,
            columns,
            out: BufWriter::new(file),
        })
    }

    fn row(&mut self, fields: &[Field<'_>]) -> Result<()> {
        let mut line = String::new();
        for (idx, field) in fields.iter().enumerate() {
            if idx > 0 {
                line.push('\t');
            }
            field.push_to(&mut line);
        }
        line.push('\n');
        self.out.write_all(line.as_bytes()).map_err(BuildError::Sink)
    }
}

enum Field<'a> {
    Text(&'a str),
    Int(i64),
    Float(Option<f64>),
    Bool(bool),
    Null,
}

impl Field<'_> {
    fn push_to(&self, out: &mut String) {
        match self {
            Field::Text(text) => escape_copy_text(text, out),
            Field::Int(value) => out.push_str(&value.to_string()),
            Field::Float(Some(value)) => out.push_str(&value.to_string()),
            Field::Float(None) | Field::Null => out.push_str("\\N"),
            Field::Bool(true) => out.push('t'),
            Field::Bool(false) => out.push('f'),
        }
    }
}

/// Escapes a value for PostgreSQL `COPY ... FROM STDIN` text format.
pub fn escape_copy_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
}

/// Writes one COPY text file per table plus a `load.sql` script with the
/// matching `\copy` commands.
pub struct CopyFileSink {
    dir: PathBuf,
    points: Table,
    branches: Table,
    polygons: Table,
    clade_centers: Table,
    ranks: Table,
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

impl CopyFileSink {
    pub fn create(dir: &Path, config: &Config) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|err| BuildError::io(dir, err))?;
        let lang = config.primary_language();
        let common = format!("common_name_{lang}");
        let rank = format!("rank_{lang}");

        let mut rank_columns = columns(&["id", "ref", "rankname", "taxid", "sci_name", "zoomview"]);
        rank_columns.extend(config.languages.iter().map(|lang| format!("rank_{lang}")));
        rank_columns.extend(columns(&["nbdesc", "convex", "geom_txt"]));

        let mut sink = Self {
            dir: dir.to_path_buf(),
            points: Table::create(
                dir,
                "points",
                columns(&[
                    "id",
                    "taxid",
                    "ref",
                    "sci_name",
                    common.as_str(),
                    rank.as_str(),
                    "nbdesc",
                    "zoomview",
                    "tip",
                    "geom_txt",
                ]),
            )?,
            branches: Table::create(
                dir,
                "branches",
                columns(&["id", "branch", "zoomview", "ref", "name", "geom_txt"]),
            )?,
            polygons: Table::create(
                dir,
                "polygons",
                columns(&[
                    "id",
                    "ref",
                    "clade",
                    "taxid",
                    "sci_name",
                    common.as_str(),
                    rank.as_str(),
                    "nbdesc",
                    "zoomview",
                    "geom_txt",
                ]),
            )?,
            clade_centers: Table::create(
                dir,
                "cladecenters",
                columns(&[
                    "id",
                    "ref",
                    "cladecenter",
                    "taxid",
                    "sci_name",
                    common.as_str(),
                    rank.as_str(),
                    "nbdesc",
                    "zoomview",
                    "geom_txt",
                ]),
            )?,
            ranks: Table::create(dir, "ranks", rank_columns)?,
        };

        let root = geo::point_wkt(Point::new(config.layout.luca_x, config.layout.luca_y));
        sink.points.row(&[
            Field::Int(ROOT_POINT_ID as i64),
            Field::Text("1"),
            Field::Null,
            Field::Text("Root"),
            Field::Text("Root"),
            Field::Text("Root"),
            Field::Int(1_000_000),
            Field::Int(1),
            Field::Bool(false),
            Field::Text(&root),
        ])?;
        Ok(sink)
    }

    fn tables(&mut self) -> [&mut Table; 5] {
        [
            &mut self.points,
            &mut self.branches,
            &mut self.polygons,
            &mut self.clade_centers,
            &mut self.ranks,
        ]
    }
}

impl RecordSink for CopyFileSink {
    fn write(&mut self, record: GeometryRecord) -> Result<()> {
        match &record {
            GeometryRecord::Point(p) => self.points.row(&[
                Field::Int(p.id as i64),
                Field::Text(&p.taxid),
                Field::Int(p.group.into()),
                Field::Text(&p.sci_name),
                Field::Text(&p.common_name),
                Field::Text(&p.rank),
                Field::Int(p.nbdesc as i64),
                Field::Int(p.zoom.into()),
                Field::Bool(p.tip),
                Field::Text(&p.geom),
            ]),
            GeometryRecord::Branch(b) => self.branches.row(&[
                Field::Int(b.id as i64),
                Field::Bool(true),
                Field::Int(b.zoom.into()),
                Field::Int(b.group.into()),
                b.name.as_deref().map(Field::Text).unwrap_or(Field::Null),
                Field::Text(&b.geom),
            ]),
            GeometryRecord::Polygon(p) => self.polygons.row(&[
                Field::Int(p.id as i64),
                Field::Int(p.group.into()),
                Field::Bool(true),
                Field::Text(&p.taxid),
                Field::Text(&p.sci_name),
                Field::Text(&p.common_name),
                Field::Text(&p.rank),
                Field::Int(p.nbdesc as i64),
                Field::Int(p.zoom.into()),
                Field::Text(&p.geom),
            ]),
            GeometryRecord::CladeCenter(c) => self.clade_centers.row(&[
                Field::Int(c.id as i64),
                Field::Int(c.group.into()),
                Field::Bool(true),
                Field::Text(&c.taxid),
                Field::Text(&c.sci_name),
                Field::Text(&c.common_name),
                Field::Text(&c.rank),
                Field::Int(c.nbdesc as i64),
                Field::Int(c.zoom.into()),
                Field::Text(&c.geom),
            ]),
            GeometryRecord::Rank(r) => {
                let mut fields = vec![
                    Field::Int(r.id as i64),
                    Field::Int(r.group.into()),
                    Field::Bool(true),
                    Field::Text(&r.taxid),
                    Field::Text(&r.sci_name),
                    Field::Int(r.zoom.into()),
                ];
                fields.extend(r.ranks.iter().map(|rank| Field::Text(rank)));
                fields.push(Field::Int(r.nbdesc as i64));
                fields.push(Field::Float(r.convexity));
                fields.push(Field::Text(&r.geom));
                self.ranks.row(&fields)
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        let mut script = String::new();
        for table in self.tables() {
            table.out.flush().map_err(BuildError::Sink)?;
            script.push_str(&format!(
                "\\copy {} ({}) FROM '{}.tsv'\n",
                table.name,
                table.columns.join(", "),
                table.name
            ));
        }
        let path = self.dir.join("load.sql");
        std::fs::write(&path, script).map_err(|err| BuildError::io(&path, err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_copy_specials() {
        let mut out = String::new();
        escape_copy_text("a\tb\\c\nd", &mut out);
        assert_eq!(out, "a\\tb\\\\c\\nd");
    }

    #[test]
    fn writes_tables_and_load_script() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let mut sink = CopyFileSink::create(dir.path(), &config).unwrap();
        sink.write(GeometryRecord::Branch(BranchRecord {
            id: 7,
            zoom: 4,
            group: 2,
            name: None,
            geom: "LINESTRING(0 0, 1 1)".to_string(),
        }))
        .unwrap();
        sink.write(GeometryRecord::Rank(RankRecord {
            id: 8,
            group: 2,
            taxid: "9606".to_string(),
            sci_name: "Homo sapiens".to_string(),
            zoom: 12,
            ranks: vec!["species".to_string(), "espèce".to_string()],
            nbdesc: 1,
            convexity: None,
            geom: "LINESTRING(0 0, 1 1, 2 0)".to_string(),
        }))
        .unwrap();
        sink.finish().unwrap();

        let branches = std::fs::read_to_string(dir.path().join("branches.tsv")).unwrap();
        assert_eq!(branches, "7\tt\t4\t2\t\\N\tLINESTRING(0 0, 1 1)\n");
        let points = std::fs::read_to_string(dir.path().join("points.tsv")).unwrap();
        assert!(points.starts_with("1000000000\t1\t\\N\tRoot"));
        let ranks = std::fs::read_to_string(dir.path().join("ranks.tsv")).unwrap();
        assert!(ranks.contains("\tspecies\tespèce\t1\t\\N\t"));
        let script = std::fs::read_to_string(dir.path().join("load.sql")).unwrap();
        assert!(script.contains(
            "\\copy ranks (id, ref, rankname, taxid, sci_name, zoomview, rank_en, rank_fr, nbdesc, \
             convex, geom_txt) FROM 'ranks.tsv'"
        ));
        assert_eq!(script.lines().count(), 5);
    }
}
