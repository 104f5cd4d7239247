//! Boolean combination trees
//!
//! Trees are owned and boxed; leaves refer to other objects by name and are
//! resolved through the directory when traversed. Removing a leaf replaces
//! its parent operator with the surviving sibling.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Row-major 4x4 homogeneous transform
pub type Matrix = [f64; 16];

pub const IDENTITY: Matrix = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// `a * b`
pub fn mat_mul(a: &Matrix, b: &Matrix) -> Matrix {
    let mut out = [0.0; 16];
    for row in 0..4 {
        for col in 0..4 {
            out[row * 4 + col] = (0..4).map(|k| a[row * 4 + k] * b[k * 4 + col]).sum();
        }
    }
    out
}

/// Reference to another object from inside a tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaf {
    pub name: String,
    /// Placement of the referenced object; `None` means identity
    pub matrix: Option<Matrix>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Leaf {
    pub fn new(name: impl Into<String>) -> Self {
        Leaf {
            name: name.into(),
            matrix: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_matrix(mut self, matrix: Matrix) -> Self {
        self.matrix = Some(matrix);
        self
    }

    /// Effective transform
    pub fn transform(&self) -> Matrix {
        self.matrix.unwrap_or(IDENTITY)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CombinationNode {
    Leaf(Leaf),
    Union(Box<CombinationNode>, Box<CombinationNode>),
    Intersect(Box<CombinationNode>, Box<CombinationNode>),
    Subtract(Box<CombinationNode>, Box<CombinationNode>),
}

/// Result of [`delete_leaf`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// At least one leaf was removed and the tree is non-empty
    Deleted,
    /// No leaf had that name; the tree is unchanged
    NotFound,
    /// The removed leaves were all that was left
    TreeEmptied,
}

impl CombinationNode {
    pub fn leaf(name: impl Into<String>) -> Self {
        CombinationNode::Leaf(Leaf::new(name))
    }

    pub fn union(left: CombinationNode, right: CombinationNode) -> Self {
        CombinationNode::Union(Box::new(left), Box::new(right))
    }

    pub fn intersect(left: CombinationNode, right: CombinationNode) -> Self {
        CombinationNode::Intersect(Box::new(left), Box::new(right))
    }

    pub fn subtract(left: CombinationNode, right: CombinationNode) -> Self {
        CombinationNode::Subtract(Box::new(left), Box::new(right))
    }

    /// Left-leaning union of the given names; `None` for an empty list
    pub fn union_of<I, S>(names: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .map(CombinationNode::leaf)
            .reduce(CombinationNode::union)
    }

    fn children(&self) -> Option<(&CombinationNode, &CombinationNode)> {
        match self {
            CombinationNode::Leaf(_) => None,
            CombinationNode::Union(l, r)
            | CombinationNode::Intersect(l, r)
            | CombinationNode::Subtract(l, r) => Some((l, r)),
        }
    }

    /// First leaf (left to right) with the given name
    pub fn find_leaf(&self, name: &str) -> Option<&Leaf> {
        match self {
            CombinationNode::Leaf(leaf) if leaf.name == name => Some(leaf),
            CombinationNode::Leaf(_) => None,
            _ => {
                let (left, right) = self.children()?;
                left.find_leaf(name).or_else(|| right.find_leaf(name))
            }
        }
    }

    pub fn contains_leaf(&self, name: &str) -> bool {
        self.find_leaf(name).is_some()
    }

    /// All leaves, left to right
    pub fn leaves(&self) -> Vec<&Leaf> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Leaf>) {
        match self {
            CombinationNode::Leaf(leaf) => out.push(leaf),
            _ => {
                if let Some((left, right)) = self.children() {
                    left.collect_leaves(out);
                    right.collect_leaves(out);
                }
            }
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self.children() {
            None => 1,
            Some((left, right)) => left.leaf_count() + right.leaf_count(),
        }
    }

    pub fn node_count(&self) -> usize {
        match self.children() {
            None => 1,
            Some((left, right)) => 1 + left.node_count() + right.node_count(),
        }
    }

    /// True when every operator in the tree is a union
    pub fn is_all_unions(&self) -> bool {
        match self {
            CombinationNode::Leaf(_) => true,
            CombinationNode::Union(l, r) => l.is_all_unions() && r.is_all_unions(),
            _ => false,
        }
    }

    /// Left-multiply every leaf transform by `matrix`
    pub fn apply_matrix(&mut self, matrix: &Matrix) {
        self.for_each_leaf_mut(&mut |leaf| {
            leaf.matrix = Some(mat_mul(matrix, &leaf.transform()));
        });
    }

    /// Point every leaf named `old` at `new`; returns how many changed
    pub fn rename_leaf(&mut self, old: &str, new: &str) -> usize {
        let mut count = 0;
        self.for_each_leaf_mut(&mut |leaf| {
            if leaf.name == old {
                leaf.name = new.to_string();
                count += 1;
            }
        });
        count
    }

    fn for_each_leaf_mut(&mut self, visit: &mut dyn FnMut(&mut Leaf)) {
        match self {
            CombinationNode::Leaf(leaf) => visit(leaf),
            CombinationNode::Union(l, r)
            | CombinationNode::Intersect(l, r)
            | CombinationNode::Subtract(l, r) => {
                l.for_each_leaf_mut(visit);
                r.for_each_leaf_mut(visit);
            }
        }
    }

    /// Drop every leaf named `name`, collapsing operators that lose a child
    fn prune(self, name: &str, removed: &mut usize) -> Option<CombinationNode> {
        let rebuild: fn(Box<CombinationNode>, Box<CombinationNode>) -> CombinationNode;
        let (left, right) = match self {
            CombinationNode::Leaf(leaf) => {
                if leaf.name == name {
                    *removed += 1;
                    return None;
                }
                return Some(CombinationNode::Leaf(leaf));
            }
            CombinationNode::Union(l, r) => {
                rebuild = CombinationNode::Union;
                (l, r)
            }
            CombinationNode::Intersect(l, r) => {
                rebuild = CombinationNode::Intersect;
                (l, r)
            }
            CombinationNode::Subtract(l, r) => {
                rebuild = CombinationNode::Subtract;
                (l, r)
            }
        };

        match ((*left).prune(name, removed), (*right).prune(name, removed)) {
            (Some(l), Some(r)) => Some(rebuild(Box::new(l), Box::new(r))),
            (Some(survivor), None) | (None, Some(survivor)) => Some(survivor),
            (None, None) => None,
        }
    }
}

/// Remove every leaf named `name` from `tree`
///
/// An emptied tree becomes `None`; the owning combination stays in the
/// database with no geometry.
pub fn delete_leaf(tree: &mut Option<CombinationNode>, name: &str) -> DeleteOutcome {
    let present = tree
        .as_ref()
        .map_or(false, |root| root.contains_leaf(name));
    if !present {
        return DeleteOutcome::NotFound;
    }

    let mut removed = 0;
    *tree = tree.take().and_then(|root| root.prune(name, &mut removed));

    if tree.is_none() {
        DeleteOutcome::TreeEmptied
    } else {
        DeleteOutcome::Deleted
    }
}
