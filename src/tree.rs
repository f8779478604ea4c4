use std::collections::{BTreeMap, VecDeque};

use crate::error::LayoutError;

/// Dense index of a node inside one [`TaxonTree`] arena.
pub type NodeId = usize;

/// Values keyed by language tag (`en`, `fr`, ...).
pub type Localized = BTreeMap<String, String>;

/// Descriptive fields of a taxon. Opaque to the layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxonInfo {
    pub taxid: String,
    pub sci_name: String,
    pub rank: Localized,
    /// Short common name, `"(first)"`, per language.
    pub common_name: Localized,
    /// Every common name, `"(a, b, c)"`, per language.
    pub common_name_long: Localized,
    pub authority: String,
    pub synonym: String,
}

impl TaxonInfo {
    pub fn new(taxid: impl Into<String>, sci_name: impl Into<String>) -> Self {
        Self {
            taxid: taxid.into(),
            sci_name: sci_name.into(),
            ..Self::default()
        }
    }

    pub fn with_rank(mut self, lang: &str, rank: impl Into<String>) -> Self {
        self.rank.insert(lang.to_string(), rank.into());
        self
    }

    pub fn rank_in(&self, lang: &str) -> &str {
        self.rank.get(lang).map(String::as_str).unwrap_or("")
    }

    pub fn common_name_in(&self, lang: &str) -> &str {
        self.common_name.get(lang).map(String::as_str).unwrap_or("")
    }

    pub fn common_name_long_in(&self, lang: &str) -> &str {
        self.common_name_long
            .get(lang)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Layout-derived attributes, written once by the layout engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedNode {
    pub subtree_size: usize,
    pub leaf_count: usize,
    pub x: f64,
    pub y: f64,
    /// Orientation in degrees.
    pub angle: f64,
    pub radius: f64,
    pub zoom: i32,
    pub branch_length: f64,
    pub point_id: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Placement {
    #[default]
    Unplaced,
    Placed(PlacedNode),
}

#[derive(Debug, Clone)]
struct TreeNode {
    info: TaxonInfo,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    placement: Placement,
}

/// Rooted, ordered tree stored as an arena. Node 0 is the root; children own
/// no data and refer to each other by index only.
#[derive(Debug, Clone)]
pub struct TaxonTree {
    nodes: Vec<TreeNode>,
}

impl TaxonTree {
    pub fn new(root: TaxonInfo) -> Self {
        Self {
            nodes: vec![TreeNode {
                info: root,
                parent: None,
                children: Vec::new(),
                placement: Placement::Unplaced,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends `info` as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, info: TaxonInfo) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            info,
            parent: Some(parent),
            children: Vec::new(),
            placement: Placement::Unplaced,
        });
        self.nodes[parent].children.push(id);
        id
    }

    pub fn info(&self, id: NodeId) -> &TaxonInfo {
        &self.nodes[id].info
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id].children.is_empty()
    }

    /// Breadth-first order starting at the root, children in stored order.
    pub fn level_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        if self.nodes.is_empty() {
            return order;
        }
        let mut queue = VecDeque::from([self.root()]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.nodes[id].children.iter().copied());
        }
        order
    }

    /// Ancestors of `id`, nearest first, root last.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.nodes[id].parent,
        }
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count()
    }

    /// Number of nodes in every subtree, self included, indexed by node id.
    pub fn subtree_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![1; self.nodes.len()];
        for id in self.level_order().into_iter().rev() {
            if let Some(parent) = self.nodes[id].parent {
                sizes[parent] += sizes[id];
            }
        }
        sizes
    }

    /// Number of leaves under every node, indexed by node id. A leaf counts
    /// itself.
    pub fn leaf_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.nodes.len()];
        for id in self.level_order().into_iter().rev() {
            if self.nodes[id].children.is_empty() {
                counts[id] = 1;
            }
            if let Some(parent) = self.nodes[id].parent {
                counts[parent] += counts[id];
            }
        }
        counts
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.children.is_empty()).count()
    }

    pub(crate) fn place(&mut self, id: NodeId, placed: PlacedNode) -> Result<(), LayoutError> {
        let node = &mut self.nodes[id];
        if let Placement::Placed(_) = node.placement {
            return Err(LayoutError::AlreadyPlaced {
                taxid: node.info.taxid.clone(),
            });
        }
        node.placement = Placement::Placed(placed);
        Ok(())
    }

    pub fn placed(&self, id: NodeId) -> Result<&PlacedNode, LayoutError> {
        match &self.nodes[id].placement {
            Placement::Placed(placed) => Ok(placed),
            Placement::Unplaced => Err(LayoutError::Unplaced {
                taxid: self.nodes[id].info.taxid.clone(),
            }),
        }
    }
}

pub struct Ancestors<'a> {
    tree: &'a TaxonTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.nodes[current].parent;
        Some(current)
    }
}
