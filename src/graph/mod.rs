use petgraph::graph::{UnGraph, NodeIndex};
use std::collections::BTreeSet;
use thiserror::Error;
use crate::model::VariableId;

/// Moralization of the per-slice dependency graph.
pub mod moral;

pub use moral::*;

/// Min-fill triangulation into minimal elimination cliques.
pub mod clique;

pub use clique::*;

/// Junction tree assembly and the compiled per-slice templates.
pub mod junction;

pub use junction::*;

#[derive(Debug, Clone, Error)]
pub enum ConstructionError {

    #[error("Template slice {slice} has {found} interface variables, but {expected} were expected")]
    InterfaceMismatch { slice : usize, expected : usize, found : usize },

    #[error("Unknown variable {0}")]
    UnknownVariable(VariableId),

    #[error("Moral graph of slice {0} has variables marked as eliminated")]
    CutVariables(usize)

}

#[derive(Debug, Clone, Error)]
pub enum JunctionTreeError {

    #[error("Junction tree is stale and must be recompiled")]
    Stale,

    #[error("No template slice {0}")]
    UnknownSlice(usize),

    #[error(transparent)]
    Construction(#[from] ConstructionError)

}

/// A node of a moral graph: one variable at one working slice (a past slice, or the
/// template slice itself). Neighbours, moral parents and children are arena indices
/// into the owning MoralGraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphVariable {

    pub var : VariableId,

    pub slice : usize,

    pub discrete : bool,

    pub in_interface : bool,

    pub cut : bool,

    neighbors : BTreeSet<usize>,

    parents : Vec<usize>,

    children : Vec<usize>

}

impl GraphVariable {

    pub fn new(var : VariableId, slice : usize, discrete : bool) -> Self {
        Self {
            var,
            slice,
            discrete,
            in_interface : false,
            cut : false,
            neighbors : BTreeSet::new(),
            parents : Vec::new(),
            children : Vec::new()
        }
    }

    pub fn neighbors(&self) -> &BTreeSet<usize> {
        &self.neighbors
    }

    pub fn add_neighbor(&mut self, ix : usize) {
        self.neighbors.insert(ix);
    }

    pub fn has_neighbor(&self, ix : usize) -> bool {
        self.neighbors.contains(&ix)
    }

    pub fn parents(&self) -> &[usize] {
        &self.parents[..]
    }

    pub fn children(&self) -> &[usize] {
        &self.children[..]
    }

}

/// Undirected graph over the variable instances relevant to one template slice. Nodes
/// live in an arena ordered by (variable, working slice), so an arena index is also a
/// deterministic rank of the node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoralGraph {

    slice : usize,

    nodes : Vec<GraphVariable>

}

impl MoralGraph {

    pub fn new(slice : usize, nodes : Vec<GraphVariable>) -> Self {
        Self { slice, nodes }
    }

    /// Template slice this graph was built for.
    pub fn slice(&self) -> usize {
        self.slice
    }

    pub fn nodes(&self) -> &[GraphVariable] {
        &self.nodes[..]
    }

    pub fn node(&self, ix : usize) -> &GraphVariable {
        &self.nodes[ix]
    }

    pub fn node_mut(&mut self, ix : usize) -> &mut GraphVariable {
        &mut self.nodes[ix]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Arena index of a variable at a working slice.
    pub fn position(&self, var : VariableId, slice : usize) -> Option<usize> {
        self.nodes.binary_search_by(|n| (n.var, n.slice).cmp(&(var, slice)) ).ok()
    }

    pub fn connect(&mut self, a : usize, b : usize) {
        if a != b {
            self.nodes[a].add_neighbor(b);
            self.nodes[b].add_neighbor(a);
        }
    }

    /// Makes the informed nodes a complete subgraph.
    pub fn connect_all(&mut self, ixs : &[usize]) {
        for (i, a) in ixs.iter().enumerate() {
            for b in ixs[i+1..].iter() {
                self.connect(*a, *b);
            }
        }
    }

    /// Records a directed dependency and its undirected edge.
    pub fn add_parent(&mut self, child : usize, parent : usize) {
        if !self.nodes[child].parents.contains(&parent) {
            self.nodes[child].parents.push(parent);
            self.nodes[parent].children.push(child);
        }
        self.connect(child, parent);
    }

    pub fn is_adjacent(&self, a : usize, b : usize) -> bool {
        self.nodes[a].has_neighbor(b)
    }

    pub fn reset_cut_variables(&mut self) {
        self.nodes.iter_mut().for_each(|n| n.cut = false );
    }

    pub fn has_cut_variables(&self) -> bool {
        self.nodes.iter().any(|n| n.cut )
    }

    pub fn interface(&self) -> Vec<usize> {
        (0..self.nodes.len()).filter(|ix| self.nodes[*ix].in_interface ).collect()
    }

    /// Neighbours not yet eliminated.
    pub fn active_neighbors(&self, ix : usize) -> Vec<usize> {
        self.nodes[ix].neighbors.iter()
            .filter(|n| !self.nodes[**n].cut )
            .cloned()
            .collect()
    }

    /// Number of edges eliminating the node would add between its active neighbours.
    pub fn fill_cost(&self, ix : usize) -> usize {
        let nbrs = self.active_neighbors(ix);
        let mut cost = 0;
        for (i, a) in nbrs.iter().enumerate() {
            for b in nbrs[i+1..].iter() {
                if !self.is_adjacent(*a, *b) {
                    cost += 1;
                }
            }
        }
        cost
    }

    /// Undirected edges as (lower, upper) arena index pairs.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        let mut edges = Vec::new();
        for (a, n) in self.nodes.iter().enumerate() {
            for b in n.neighbors.range((a+1)..) {
                edges.push((a, *b));
            }
        }
        edges
    }

    /// Edge (by variable and working slice) lookup.
    pub fn has_edge(&self, a : (VariableId, usize), b : (VariableId, usize)) -> bool {
        match (self.position(a.0, a.1), self.position(b.0, b.1)) {
            (Some(ia), Some(ib)) => self.is_adjacent(ia, ib),
            _ => false
        }
    }

}

#[test]
fn connect_all_is_symmetric() {
    let nodes = (0..4).map(|v| GraphVariable::new(v, 0, true) ).collect();
    let mut g = MoralGraph::new(0, nodes);
    g.connect_all(&[0, 2, 3]);
    assert!(g.is_adjacent(3, 0) && g.is_adjacent(0, 3));
    assert!(!g.is_adjacent(0, 1));
    assert_eq!(g.edges(), vec![(0, 2), (0, 3), (2, 3)]);
    assert_eq!(g.fill_cost(1), 0);
    assert_eq!(g.position(2, 0), Some(2));
}
