use std::collections::HashMap;
use std::fmt;

use generational_arena::{Arena, Index};
use tracing::{debug, instrument};

use crate::domain::branch::BranchId;
use crate::domain::error::{DomainError, DomainResult};

/// Data payload for tree nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    /// Unique node name
    pub name: String,
    /// Length of the branch to the parent, if the source tree carried one
    pub length: Option<f64>,
}

impl NodeData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            length: None,
        }
    }

    pub fn with_length(mut self, length: Option<f64>) -> Self {
        self.length = length;
        self
    }
}

impl fmt::Display for NodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Tree node in the arena-based hierarchy structure.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub data: NodeData,
    /// Index of parent node in the arena, None for the root
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena
    pub children: Vec<Index>,
}

/// Rooted, named phylogenetic tree stored in a generational arena.
///
/// Node names are unique; branches are addressed by [`BranchId`]. The root is
/// an analysis artifact: [`reroot`](Self::reroot) moves it to any internal
/// node without renaming anything, so the edge set is unchanged.
#[derive(Debug, Clone)]
pub struct PhyloTree {
    arena: Arena<TreeNode>,
    root: Option<Index>,
    names: HashMap<String, Index>,
}

impl Default for PhyloTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PhyloTree {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            root: None,
            names: HashMap::new(),
        }
    }

    /// Inserts a node under `parent`; a `None` parent makes it the root.
    #[instrument(level = "trace", skip(self))]
    pub fn insert_node(&mut self, data: NodeData, parent: Option<Index>) -> DomainResult<Index> {
        if self.names.contains_key(&data.name) {
            return Err(DomainError::DuplicateNode(data.name));
        }
        if parent.is_none() && self.root.is_some() {
            return Err(DomainError::InvalidTree(format!(
                "second root: {}",
                data.name
            )));
        }
        let name = data.name.clone();
        let node_idx = self.arena.insert(TreeNode {
            data,
            parent,
            children: Vec::new(),
        });

        if let Some(parent_idx) = parent {
            match self.arena.get_mut(parent_idx) {
                Some(parent) => parent.children.push(node_idx),
                None => {
                    self.arena.remove(node_idx);
                    return Err(DomainError::InvalidTree(format!(
                        "parent of {name} is not in the tree"
                    )));
                }
            }
        } else {
            self.root = Some(node_idx);
        }
        self.names.insert(name, node_idx);

        Ok(node_idx)
    }

    /// Checks the structural invariants the identifiability checks rely on.
    pub fn validate(&self) -> DomainResult<()> {
        let root = self
            .root
            .ok_or_else(|| DomainError::InvalidTree("empty tree".to_string()))?;
        if self.children(root).len() < 2 {
            return Err(DomainError::InvalidTree(format!(
                "root {} must have at least two children",
                self.name(root)
            )));
        }
        Ok(())
    }

    pub fn get_node(&self, idx: Index) -> Option<&TreeNode> {
        self.arena.get(idx)
    }

    pub fn root(&self) -> Option<Index> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Looks up a node by name.
    pub fn node_index(&self, name: &str) -> DomainResult<Index> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| DomainError::UnknownNode(name.to_string()))
    }

    /// Name of the node at `idx`; empty for stale indices.
    pub fn name(&self, idx: Index) -> &str {
        self.arena
            .get(idx)
            .map(|n| n.data.name.as_str())
            .unwrap_or("")
    }

    pub fn parent(&self, idx: Index) -> Option<Index> {
        self.arena.get(idx).and_then(|n| n.parent)
    }

    pub fn children(&self, idx: Index) -> &[Index] {
        self.arena
            .get(idx)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_tip(&self, idx: Index) -> bool {
        self.children(idx).is_empty()
    }

    /// Number of neighbours, ignoring direction.
    pub fn degree(&self, idx: Index) -> usize {
        self.children(idx).len() + usize::from(self.parent(idx).is_some())
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self, idx: Index) -> Vec<Index> {
        let mut ancestors = Vec::new();
        let mut current = self.parent(idx);
        while let Some(node) = current {
            ancestors.push(node);
            current = self.parent(node);
        }
        ancestors
    }

    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self)
    }

    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self)
    }

    /// Tips in left-to-right order.
    pub fn tips(&self) -> Vec<Index> {
        self.iter()
            .filter(|(_, node)| node.children.is_empty())
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn tip_names(&self) -> Vec<String> {
        self.tips()
            .into_iter()
            .map(|idx| self.name(idx).to_string())
            .collect()
    }

    /// Root and internal nodes, in preorder.
    pub fn internal_nodes(&self) -> Vec<Index> {
        self.iter()
            .filter(|(_, node)| !node.children.is_empty())
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn internal_names(&self) -> Vec<String> {
        self.internal_nodes()
            .into_iter()
            .map(|idx| self.name(idx).to_string())
            .collect()
    }

    /// Branch joining `idx` to its parent.
    pub fn branch_to_parent(&self, idx: Index) -> Option<BranchId> {
        self.parent(idx)
            .map(|parent| BranchId::new(self.name(idx), self.name(parent)))
    }

    /// All branches, in preorder of their child endpoint.
    pub fn edges(&self) -> Vec<BranchId> {
        self.iter()
            .filter_map(|(idx, _)| self.branch_to_parent(idx))
            .collect()
    }

    /// The endpoint of `branch` that is the child under the current rooting.
    pub fn child_endpoint(&self, branch: &BranchId) -> DomainResult<Index> {
        let (a, b) = branch.nodes();
        let (ia, ib) = (self.node_index(a)?, self.node_index(b)?);
        if self.parent(ia) == Some(ib) {
            Ok(ia)
        } else if self.parent(ib) == Some(ia) {
            Ok(ib)
        } else {
            Err(DomainError::UnknownBranch(branch.clone()))
        }
    }

    /// Moves the root to the internal node `name`.
    ///
    /// Parent/child relations are reversed along the path from the old root
    /// to the new one; branch lengths travel with their branches and every
    /// name is kept.
    #[instrument(level = "debug", skip(self))]
    pub fn reroot(&mut self, name: &str) -> DomainResult<()> {
        let new_root = self.node_index(name)?;
        if self.is_tip(new_root) {
            return Err(DomainError::RerootAtTip(name.to_string()));
        }
        if self.root == Some(new_root) {
            return Ok(());
        }

        let mut path = vec![new_root];
        path.extend(self.ancestors(new_root));
        let lengths: Vec<Option<f64>> = path
            .iter()
            .map(|&idx| self.arena[idx].data.length)
            .collect();

        for (step, pair) in path.windows(2).enumerate() {
            let (child, parent) = (pair[0], pair[1]);
            self.arena[parent].children.retain(|&c| c != child);
            self.arena[parent].parent = Some(child);
            self.arena[parent].data.length = lengths[step];
            self.arena[child].children.push(parent);
        }
        self.arena[new_root].parent = None;
        self.arena[new_root].data.length = None;
        self.root = Some(new_root);
        debug!("rerooted at {} via {} nodes", name, path.len());
        Ok(())
    }

    /// Newick text with every node name; lengths are written when present.
    pub fn to_newick(&self) -> String {
        let mut written: HashMap<Index, String> = HashMap::with_capacity(self.len());
        for (idx, node) in self.iter_postorder() {
            let mut text = String::new();
            if !node.children.is_empty() {
                let inner: Vec<String> = node
                    .children
                    .iter()
                    .filter_map(|child| written.remove(child))
                    .collect();
                text.push('(');
                text.push_str(&inner.join(","));
                text.push(')');
            }
            text.push_str(&node.data.name);
            if let Some(length) = node.data.length {
                text.push_str(&format!(":{length}"));
            }
            written.insert(idx, text);
        }
        let mut out = self
            .root
            .and_then(|root| written.remove(&root))
            .unwrap_or_default();
        out.push(';');
        out
    }
}

pub struct TreeIterator<'a> {
    tree: &'a PhyloTree,
    stack: Vec<Index>,
}

impl<'a> TreeIterator<'a> {
    fn new(tree: &'a PhyloTree) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = tree.root() {
            stack.push(root);
        }
        Self { tree, stack }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        let current_idx = self.stack.pop()?;
        let node = self.tree.get_node(current_idx)?;
        // Push children in reverse order for left-to-right traversal
        for &child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some((current_idx, node))
    }
}

pub struct PostOrderIterator<'a> {
    tree: &'a PhyloTree,
    stack: Vec<(Index, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(tree: &'a PhyloTree) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = tree.root() {
            stack.push((root, false));
        }
        Self { tree, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.tree.get_node(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}
