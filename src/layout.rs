//! Radial layout of a taxon tree.
//!
//! Every node owns a circle of radius `r` centred on its position. Its
//! children share the half plane facing away from the parent: each child gets
//! a wedge proportional to the square root of its leaf count, and a radius
//! that makes its circle fit inside that wedge. Chains of single children
//! shrink by a fixed ratio instead, so they stay visible.

use serde::{Deserialize, Serialize};

use crate::config::LayoutConfig;
use crate::error::LayoutError;
use crate::tree::{NodeId, PlacedNode, TaxonTree};

/// The three trees drawn on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Group {
    Archaea,
    Eukaryotes,
    Bacteria,
}

impl Group {
    pub const ALL: [Group; 3] = [Group::Archaea, Group::Eukaryotes, Group::Bacteria];

    /// Reference number stored with every record.
    pub fn number(self) -> u8 {
        match self {
            Group::Archaea => 1,
            Group::Eukaryotes => 2,
            Group::Bacteria => 3,
        }
    }

    /// NCBI taxid of the group root.
    pub fn root_taxid(self) -> &'static str {
        match self {
            Group::Archaea => "2157",
            Group::Eukaryotes => "2759",
            Group::Bacteria => "2",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Group::Archaea => "archaea",
            Group::Eukaryotes => "eukaryotes",
            Group::Bacteria => "bacteria",
        }
    }
}

/// Position, orientation and radius given to a group root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutAnchor {
    pub group: Group,
    pub x: f64,
    pub y: f64,
    /// Degrees.
    pub angle: f64,
    pub radius: f64,
}

/// Hands out geometry ids. `last` is the highest id already taken, so the
/// value returned by [`IdAllocator::last`] after one group is the start of
/// the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdAllocator {
    last: u64,
}

impl IdAllocator {
    pub fn starting_after(last: u64) -> Self {
        Self { last }
    }

    pub fn next_id(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// Takes `count` consecutive ids and returns the first one.
    pub fn reserve(&mut self, count: u64) -> u64 {
        let first = self.last + 1;
        self.last += count;
        first
    }

    pub fn last(&self) -> u64 {
        self.last
    }
}

/// How a node with a single child shrinks that child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degeneracy {
    /// Two or more children (or none): wedge packing.
    None,
    /// One child, several leaves below: radius shrinks by 20%.
    Chain,
    /// One child leading to a single leaf: radius shrinks by 50%.
    SingleLeafChain,
}

impl Degeneracy {
    pub fn classify(child_count: usize, leaf_count: usize) -> Self {
        match (child_count, leaf_count) {
            (1, 1) => Degeneracy::SingleLeafChain,
            (1, _) => Degeneracy::Chain,
            _ => Degeneracy::None,
        }
    }
}

/// Where a parent sits; the reference frame of its children.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChildSlot {
    pub half_angle: f64,
    pub angle: f64,
    pub radius: f64,
    pub branch_length: f64,
    pub x: f64,
    pub y: f64,
}

/// Splits the half plane in front of `parent` between children with the
/// given leaf counts, in order.
pub fn fan_out(
    parent: &Frame,
    degeneracy: Degeneracy,
    child_leaf_counts: &[usize],
) -> Vec<ChildSlot> {
    let weights: Vec<f64> = child_leaf_counts
        .iter()
        .map(|count| (*count as f64).sqrt())
        .collect();
    let total: f64 = weights.iter().sum();
    let offset = 90.0 - parent.angle;

    let mut slots = Vec::with_capacity(weights.len());
    let mut cumulative = 0.0;
    for weight in weights {
        let half_angle = 180.0 * (weight / total) / 2.0;
        let radius = match degeneracy {
            Degeneracy::Chain => parent.radius - parent.radius * 0.2,
            Degeneracy::SingleLeafChain => parent.radius - parent.radius * 0.5,
            Degeneracy::None => {
                let tan = half_angle.to_radians().tan();
                (parent.radius * tan) / (1.0 + tan)
            }
        };
        let branch_length = parent.radius - radius;

        // Each wedge is counted twice; its centre sits after the first half.
        cumulative += half_angle;
        let angle = cumulative - offset;
        cumulative += half_angle;

        let theta = angle.to_radians();
        slots.push(ChildSlot {
            half_angle,
            angle,
            radius,
            branch_length,
            x: parent.x + branch_length * theta.cos(),
            y: parent.y + branch_length * theta.sin(),
        });
    }
    slots
}

/// `ceil(log2(zoom_base / radius))`, never below 0. `None` when the ratio is
/// not a finite positive number.
pub fn zoom_level(zoom_base: f64, radius: f64) -> Option<i32> {
    let ratio = zoom_base / radius;
    if !(ratio.is_finite() && ratio > 0.0) {
        return None;
    }
    let zoom = ratio.log2().ceil();
    Some(if zoom <= 0.0 { 0 } else { zoom as i32 })
}

fn checked_zoom(
    tree: &TaxonTree,
    id: NodeId,
    zoom_base: f64,
    radius: f64,
) -> Result<i32, LayoutError> {
    zoom_level(zoom_base, radius).ok_or_else(|| LayoutError::Degenerate {
        taxid: tree.info(id).taxid.clone(),
        message: format!("no zoom level for radius {radius}"),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutSummary {
    pub group: Group,
    pub node_count: usize,
    pub leaf_count: usize,
    pub max_zoom: i32,
    /// Last id handed out while numbering the nodes.
    pub last_point_id: u64,
}

/// Places every node of `tree` and numbers it. Leaves take a contiguous block
/// of ids in level order; internal nodes take the ids after that block.
pub fn layout_tree(
    tree: &mut TaxonTree,
    anchor: &LayoutAnchor,
    ids: &mut IdAllocator,
    config: &LayoutConfig,
) -> Result<LayoutSummary, LayoutError> {
    if !(anchor.radius.is_finite() && anchor.radius > 0.0) {
        return Err(LayoutError::InvalidAnchor {
            radius: anchor.radius,
        });
    }

    let sizes = tree.subtree_sizes();
    let leaves = tree.leaf_counts();
    let leaf_total = tree.leaf_count();
    let mut next_leaf_id = ids.reserve(leaf_total as u64);
    let mut point_id = |is_leaf: bool, ids: &mut IdAllocator| {
        if is_leaf {
            next_leaf_id += 1;
            next_leaf_id - 1
        } else {
            ids.next_id()
        }
    };

    let root = tree.root();
    let root_id = point_id(tree.is_leaf(root), ids);
    let root_zoom = checked_zoom(tree, root, config.zoom_base, anchor.radius)?;
    tree.place(
        root,
        PlacedNode {
            subtree_size: sizes[root],
            leaf_count: leaves[root],
            x: anchor.x,
            y: anchor.y,
            angle: anchor.angle,
            radius: anchor.radius,
            zoom: root_zoom,
            branch_length: 0.0,
            point_id: root_id,
        },
    )?;

    let mut max_zoom = root_zoom;
    for id in tree.level_order() {
        let children = tree.children(id).to_vec();
        if children.is_empty() {
            continue;
        }
        let parent = tree.placed(id)?;
        let frame = Frame {
            x: parent.x,
            y: parent.y,
            angle: parent.angle,
            radius: parent.radius,
        };
        let degeneracy = Degeneracy::classify(children.len(), leaves[id]);
        let child_leaves: Vec<usize> = children.iter().map(|child| leaves[*child]).collect();

        for (child, slot) in children.iter().zip(fan_out(&frame, degeneracy, &child_leaves)) {
            let finite = slot.radius.is_finite() && slot.x.is_finite() && slot.y.is_finite();
            if !(finite && slot.radius > 0.0) {
                return Err(LayoutError::Degenerate {
                    taxid: tree.info(*child).taxid.clone(),
                    message: format!("radius {} at angle {}", slot.radius, slot.angle),
                });
            }
            let zoom = checked_zoom(tree, *child, config.zoom_base, slot.radius)?;
            max_zoom = max_zoom.max(zoom);
            let child_point_id = point_id(tree.is_leaf(*child), ids);
            tree.place(
                *child,
                PlacedNode {
                    subtree_size: sizes[*child],
                    leaf_count: leaves[*child],
                    x: slot.x,
                    y: slot.y,
                    angle: slot.angle,
                    radius: slot.radius,
                    zoom,
                    branch_length: slot.branch_length,
                    point_id: child_point_id,
                },
            )?;
        }
    }

    tracing::debug!(
        group = anchor.group.name(),
        nodes = tree.len(),
        leaves = leaf_total,
        max_zoom,
        "layout done"
    );

    Ok(LayoutSummary {
        group: anchor.group,
        node_count: tree.len(),
        leaf_count: leaf_total,
        max_zoom,
        last_point_id: ids.last(),
    })
}
