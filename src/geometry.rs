//! Map geometries derived from a placed tree: node points, branches bent
//! through a geodesic midpoint, clade polygons with their centers, and the
//! short lines carrying rank names.

use crate::config::Config;
use crate::error::Result;
use crate::geo::{self, Point};
use crate::layout::{Group, IdAllocator};
use crate::sink::RecordSink;
use crate::tree::{NodeId, PlacedNode, TaxonTree};

/// Samples per half of a clade outline.
pub const OUTLINE_STEPS: usize = 30;
/// Ids reserved per clade; the last three are used.
pub const CLADE_ID_BLOCK: u64 = 63;
const POLYGON_ID_OFFSET: u64 = 60;
const CENTER_ID_OFFSET: u64 = 61;
const RANK_ID_OFFSET: u64 = 62;
/// Outline points kept in the polygon ring before closing it.
const RING_POINTS: usize = 59;
/// Outline points carrying the rank label.
const RANK_WINDOW: [usize; 3] = [39, 40, 41];

#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub id: u64,
    pub taxid: String,
    pub group: u8,
    pub sci_name: String,
    pub common_name: String,
    pub rank: String,
    pub nbdesc: usize,
    pub zoom: i32,
    pub tip: bool,
    pub geom: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchRecord {
    pub id: u64,
    pub zoom: i32,
    pub group: u8,
    pub name: Option<String>,
    pub geom: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolygonRecord {
    pub id: u64,
    pub group: u8,
    pub taxid: String,
    pub sci_name: String,
    pub common_name: String,
    pub rank: String,
    pub nbdesc: usize,
    pub zoom: i32,
    pub geom: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CladeCenterRecord {
    pub id: u64,
    pub group: u8,
    pub taxid: String,
    pub sci_name: String,
    pub common_name: String,
    pub rank: String,
    pub nbdesc: usize,
    pub zoom: i32,
    pub geom: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankRecord {
    pub id: u64,
    pub group: u8,
    pub taxid: String,
    pub sci_name: String,
    pub zoom: i32,
    /// Rank name in every configured language, in config order.
    pub ranks: Vec<String>,
    pub nbdesc: usize,
    /// Curl of the label line; `None` when a chord is vertical.
    pub convexity: Option<f64>,
    pub geom: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeometryRecord {
    Point(PointRecord),
    Branch(BranchRecord),
    Polygon(PolygonRecord),
    CladeCenter(CladeCenterRecord),
    Rank(RankRecord),
}

impl GeometryRecord {
    pub fn id(&self) -> u64 {
        match self {
            GeometryRecord::Point(r) => r.id,
            GeometryRecord::Branch(r) => r.id,
            GeometryRecord::Polygon(r) => r.id,
            GeometryRecord::CladeCenter(r) => r.id,
            GeometryRecord::Rank(r) => r.id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SynthesisSummary {
    pub points: usize,
    pub branches: usize,
    pub clades: usize,
}

/// Shape of one clade, before it is turned into records.
#[derive(Debug, Clone, PartialEq)]
pub struct CladeShape {
    pub ring: Vec<Point>,
    pub center: Point,
    pub rank_line: Vec<Point>,
    pub convexity: Option<f64>,
}

pub fn clade_shape(placed: &PlacedNode) -> CladeShape {
    let outline = geo::clade_outline(
        Point::new(placed.x, placed.y),
        placed.radius,
        placed.angle,
        OUTLINE_STEPS,
    );
    let center = geo::centroid(&outline);

    let mut ring: Vec<Point> = outline[..RING_POINTS].to_vec();
    ring.push(outline[0]);

    let rank_line: Vec<Point> = RANK_WINDOW.iter().map(|idx| outline[*idx]).collect();
    let convexity = convexity(rank_line[0], rank_line[1], rank_line[2]);

    CladeShape {
        ring,
        center,
        rank_line,
        convexity,
    }
}

/// Slope change between the chords `start-mid` and `mid-end`, read left to
/// right.
pub fn convexity(start: Point, mid: Point, end: Point) -> Option<f64> {
    let (start, end) = if start.x > end.x { (end, start) } else { (start, end) };
    let slope1 = (mid.y - start.y) / (mid.x - start.x);
    let slope2 = (end.y - mid.y) / (end.x - mid.x);
    let value = slope1 - slope2;
    value.is_finite().then_some(value)
}

/// `"←  left     -     right  →"`, the leftmost node named first.
pub fn branch_name(parent_label: &str, child_label: &str, parent_x: f64, child_x: f64) -> String {
    let (left, right) = if child_x >= parent_x {
        (parent_label, child_label)
    } else {
        (child_label, parent_label)
    };
    format!("\u{2190}  {left}     -     {right}  \u{2192}")
}

fn label(tree: &TaxonTree, id: NodeId, lang: &str) -> String {
    let info = tree.info(id);
    format!("{} {}", info.sci_name, info.common_name_in(lang))
}

/// Emits every record of one placed group tree into `sink`. Ids come from
/// `ids` in level order: one per branch, a block of [`CLADE_ID_BLOCK`] per
/// internal node, and a final one for the branch joining LUCA to the root.
pub fn synthesize<S: RecordSink + ?Sized>(
    tree: &TaxonTree,
    group: Group,
    ids: &mut IdAllocator,
    config: &Config,
    sink: &mut S,
) -> Result<SynthesisSummary> {
    let lang = config.primary_language();
    let group_nb = group.number();
    let order = tree.level_order();
    let mut summary = SynthesisSummary::default();

    for id in &order {
        let placed = tree.placed(*id)?;
        let info = tree.info(*id);
        sink.write(GeometryRecord::Point(PointRecord {
            id: placed.point_id,
            taxid: info.taxid.clone(),
            group: group_nb,
            sci_name: info.sci_name.clone(),
            common_name: info.common_name_in(lang).to_string(),
            rank: info.rank_in(lang).to_string(),
            nbdesc: placed.leaf_count,
            zoom: placed.zoom,
            tip: tree.is_leaf(*id),
            geom: geo::point_wkt(Point::new(placed.x, placed.y)),
        }))?;
        summary.points += 1;
    }

    for id in &order {
        let placed = *tree.placed(*id)?;
        let info = tree.info(*id);

        if let Some(parent) = tree.parent(*id) {
            let up = tree.placed(parent)?;
            let from = Point::new(up.x, up.y);
            let to = Point::new(placed.x, placed.y);
            let mid = geo::midpoint(from, to);
            sink.write(GeometryRecord::Branch(BranchRecord {
                id: ids.next_id(),
                zoom: placed.zoom,
                group: group_nb,
                name: Some(branch_name(
                    &label(tree, parent, lang),
                    &label(tree, *id, lang),
                    up.x,
                    placed.x,
                )),
                geom: geo::linestring_wkt(&[from, mid, to]),
            }))?;
            summary.branches += 1;
        }

        if !tree.is_leaf(*id) {
            let block = ids.reserve(CLADE_ID_BLOCK) - 1;
            let shape = clade_shape(&placed);
            let rank = info.rank_in(lang).to_string();
            let common_name = info.common_name_in(lang).to_string();
            sink.write(GeometryRecord::Polygon(PolygonRecord {
                id: block + POLYGON_ID_OFFSET + 1,
                group: group_nb,
                taxid: info.taxid.clone(),
                sci_name: info.sci_name.clone(),
                common_name: common_name.clone(),
                rank: rank.clone(),
                nbdesc: placed.leaf_count,
                zoom: placed.zoom,
                geom: geo::polygon_wkt(&shape.ring),
            }))?;
            sink.write(GeometryRecord::CladeCenter(CladeCenterRecord {
                id: block + CENTER_ID_OFFSET + 1,
                group: group_nb,
                taxid: info.taxid.clone(),
                sci_name: info.sci_name.clone(),
                common_name,
                rank,
                nbdesc: placed.leaf_count,
                zoom: placed.zoom,
                geom: geo::point_wkt(shape.center),
            }))?;
            sink.write(GeometryRecord::Rank(RankRecord {
                id: block + RANK_ID_OFFSET + 1,
                group: group_nb,
                taxid: info.taxid.clone(),
                sci_name: info.sci_name.clone(),
                zoom: placed.zoom,
                ranks: config
                    .languages
                    .iter()
                    .map(|lang| info.rank_in(lang).to_string())
                    .collect(),
                nbdesc: placed.leaf_count,
                convexity: shape.convexity,
                geom: geo::linestring_wkt(&shape.rank_line),
            }))?;
            summary.clades += 1;
        }
    }

    let root = tree.placed(tree.root())?;
    let luca = Point::new(config.layout.luca_x, config.layout.luca_y);
    sink.write(GeometryRecord::Branch(BranchRecord {
        id: ids.next_id(),
        zoom: config.layout.luca_branch_zoom,
        group: group_nb,
        name: None,
        geom: geo::linestring_wkt(&[luca, Point::new(root.x, root.y)]),
    }))?;
    summary.branches += 1;

    tracing::debug!(
        group = group.name(),
        points = summary.points,
        branches = summary.branches,
        clades = summary.clades,
        last_id = ids.last(),
        "geometries written"
    );
    Ok(summary)
}
