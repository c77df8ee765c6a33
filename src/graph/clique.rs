use super::*;
use std::collections::BTreeMap;

/// A set of moral graph nodes (arena indices) that are eliminated together, or the set of
/// forward interface nodes of one working slice. Interface cliques are never pruned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clique {

    nodes : BTreeSet<usize>,

    interface : bool,

    neighbors : Vec<usize>,

    separators : Vec<usize>

}

impl Clique {

    pub fn new(nodes : BTreeSet<usize>, interface : bool) -> Self {
        Self { nodes, interface, neighbors : Vec::new(), separators : Vec::new() }
    }

    pub fn nodes(&self) -> &BTreeSet<usize> {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, ix : usize) -> bool {
        self.nodes.contains(&ix)
    }

    pub fn is_interface(&self) -> bool {
        self.interface
    }

    /// Indices of the adjacent cliques in the junction tree.
    pub fn neighbors(&self) -> &[usize] {
        &self.neighbors[..]
    }

    /// Indices of the separators this clique is an endpoint of.
    pub fn separators(&self) -> &[usize] {
        &self.separators[..]
    }

    pub(crate) fn link(&mut self, clique : usize, separator : usize) {
        self.neighbors.push(clique);
        self.separators.push(separator);
    }

    pub fn is_subset(&self, other : &Clique) -> bool {
        self.nodes.is_subset(&other.nodes)
    }

    pub fn is_proper_subset(&self, other : &Clique) -> bool {
        self.nodes.len() < other.nodes.len() && self.is_subset(other)
    }

    /// The (variable, working slice) pairs of the clique members.
    pub fn members(&self, graph : &MoralGraph) -> Vec<(VariableId, usize)> {
        self.nodes.iter().map(|ix| (graph.node(*ix).var, graph.node(*ix).slice) ).collect()
    }

}

/// Greedy min-fill triangulation of a moral graph.
///
/// The node chosen at each step is the one whose elimination adds the fewest edges among
/// its remaining neighbours (ties go to the lowest arena index; a node that adds no edge is
/// taken immediately). Its remaining neighbours are made complete, and the node together
/// with them forms an elimination clique. The cliques are then listed from the last
/// eliminated to the first, each clique contained in a later listed one being replaced by
/// it, which leaves the maximal cliques in an order satisfying the running intersection
/// property. One interface clique per working slice is appended at the end.
///
/// The moral graph is not modified; fill-in edges are added to a working copy.
pub fn eliminate(graph : &MoralGraph) -> Result<Vec<Clique>, ConstructionError> {
    if graph.has_cut_variables() {
        return Err(ConstructionError::CutVariables(graph.slice()));
    }

    let mut by_slice : BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for ix in graph.interface() {
        by_slice.entry(graph.node(ix).slice).or_insert_with(BTreeSet::new).insert(ix);
    }
    let interface : Vec<Clique> = by_slice.into_iter()
        .map(|(_, nodes)| Clique::new(nodes, true) )
        .collect();

    let mut work = graph.clone();
    let mut elim = Vec::with_capacity(work.len());
    while let Some(ix) = next_to_eliminate(&work) {
        let nbrs = work.active_neighbors(ix);
        work.connect_all(&nbrs[..]);
        work.node_mut(ix).cut = true;
        let mut nodes : BTreeSet<usize> = nbrs.into_iter().collect();
        nodes.insert(ix);
        log::trace!("Eliminated node {} (slice {}): clique {:?}", ix, graph.slice(), nodes);
        elim.push(Clique::new(nodes, false));
    }

    elim.reverse();
    let mut cliques = minimize(elim);
    cliques.extend(interface);
    Ok(cliques)
}

fn next_to_eliminate(graph : &MoralGraph) -> Option<usize> {
    let mut best : Option<(usize, usize)> = None;
    for ix in 0..graph.len() {
        if graph.node(ix).cut {
            continue;
        }
        let cost = graph.fill_cost(ix);
        if best.map(|(_, c)| cost < c ).unwrap_or(true) {
            best = Some((ix, cost));
            if cost == 0 {
                break;
            }
        }
    }
    best.map(|(ix, _)| ix )
}

/// Replaces every clique by the first later-listed clique that strictly contains it.
fn minimize(mut cliques : Vec<Clique>) -> Vec<Clique> {
    let mut i = 0;
    while i < cliques.len() {
        let sup = (i+1..cliques.len()).find(|j| !cliques[*j].interface && cliques[i].is_proper_subset(&cliques[*j]) );
        match sup {
            Some(j) => {
                let c = cliques.remove(j);
                cliques[i] = c;
            },
            None => {
                i += 1;
            }
        }
    }
    cliques
}

#[cfg(test)]
fn graph_from_edges(n : usize, edges : &[(usize, usize)]) -> MoralGraph {
    let nodes = (0..n).map(|v| GraphVariable::new(v, 0, true) ).collect();
    let mut g = MoralGraph::new(0, nodes);
    for (a, b) in edges {
        g.connect(*a, *b);
    }
    g
}

#[test]
fn chain_cliques() {
    let g = graph_from_edges(3, &[(0, 1), (1, 2)]);
    let cliques = eliminate(&g).unwrap();
    let sets : Vec<Vec<usize>> = cliques.iter().map(|c| c.nodes().iter().cloned().collect() ).collect();
    assert_eq!(sets, vec![vec![1, 2], vec![0, 1]]);
}

#[test]
fn cycle_receives_one_fill_edge() {
    // Four-cycle 0-1-2-3-0: any elimination adds one chord, leaving two triangles.
    let g = graph_from_edges(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]);
    let cliques = eliminate(&g).unwrap();
    assert_eq!(cliques.len(), 2);
    assert!(cliques.iter().all(|c| c.len() == 3 ));
    assert_eq!(g.edges().len(), 4);
}

#[test]
fn cut_graph_is_refused() {
    let mut g = graph_from_edges(2, &[(0, 1)]);
    g.node_mut(0).cut = true;
    assert!(eliminate(&g).is_err());
}
