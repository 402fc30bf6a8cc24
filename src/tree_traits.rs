//! ASCII rendering of phylogenetic trees via `termtree`.

use std::collections::HashMap;

use generational_arena::Index;
use termtree::Tree;
use tracing::instrument;

use crate::domain::{MatrixCategory, ModelMatrixCategories, PhyloTree};

pub trait TreeNodeConvert {
    fn to_tree_string(&self) -> Tree<String>;

    /// Same as [`to_tree_string`](Self::to_tree_string), each node suffixed
    /// with the category of the branch to its parent when not DLC.
    fn to_labelled_tree(&self, mcats: &ModelMatrixCategories) -> Tree<String>;
}

fn node_label(tree: &PhyloTree, idx: Index, mcats: Option<&ModelMatrixCategories>) -> String {
    let mut label = tree.name(idx).to_string();
    if let Some(length) = tree.get_node(idx).and_then(|n| n.data.length) {
        label.push_str(&format!(":{length}"));
    }
    let category = mcats
        .zip(tree.branch_to_parent(idx))
        .and_then(|(mcats, branch)| mcats.get(&branch));
    if let Some(category) = category.filter(|c| *c != MatrixCategory::Dlc) {
        label.push_str(&format!(" [{category}]"));
    }
    label
}

/// Builds bottom-up so deep trees do not recurse.
fn build_tree(tree: &PhyloTree, mcats: Option<&ModelMatrixCategories>) -> Tree<String> {
    let mut built: HashMap<Index, Tree<String>> = HashMap::with_capacity(tree.len());
    for (idx, node) in tree.iter_postorder() {
        let leaves: Vec<Tree<String>> = node
            .children
            .iter()
            .filter_map(|child| built.remove(child))
            .collect();
        built.insert(idx, Tree::new(node_label(tree, idx, mcats)).with_leaves(leaves));
    }
    tree.root()
        .and_then(|root| built.remove(&root))
        .unwrap_or_else(|| Tree::new("Empty tree".to_string()))
}

impl TreeNodeConvert for PhyloTree {
    #[instrument(level = "debug", skip_all)]
    fn to_tree_string(&self) -> Tree<String> {
        build_tree(self, None)
    }

    fn to_labelled_tree(&self, mcats: &ModelMatrixCategories) -> Tree<String> {
        build_tree(self, Some(mcats))
    }
}
