use super::*;
use crate::model::Topology;
use petgraph::algo::all_simple_paths;

/// The intersection between two adjacent cliques of a junction tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliqueSeparator {

    nodes : BTreeSet<usize>,

    cliques : (usize, usize)

}

impl CliqueSeparator {

    pub fn nodes(&self) -> &BTreeSet<usize> {
        &self.nodes
    }

    /// Indices of the two endpoint cliques (the earlier listed clique first).
    pub fn cliques(&self) -> (usize, usize) {
        self.cliques
    }

}

/// Links every clique to the closest earlier clique holding its intersection with all
/// earlier cliques. When the cliques are ordered such that the running intersection
/// property holds, this produces a junction tree. The result is always a single tree: a
/// clique sharing nothing with the earlier ones is linked to its predecessor through an
/// empty separator.
pub fn assemble(cliques : &mut [Clique]) -> Vec<CliqueSeparator> {
    let mut separators = Vec::new();
    if cliques.len() <= 1 {
        return separators;
    }
    let mut seen : BTreeSet<usize> = cliques[0].nodes().clone();
    for i in 1..cliques.len() {
        let intersect : BTreeSet<usize> = cliques[i].nodes().intersection(&seen).cloned().collect();
        for j in (0..i).rev() {
            if intersect.is_subset(cliques[j].nodes()) {
                let sep_ix = separators.len();
                separators.push(CliqueSeparator { nodes : intersect.clone(), cliques : (j, i) });
                cliques[j].link(i, sep_ix);
                cliques[i].link(j, sep_ix);
                break;
            }
        }
        seen.extend(cliques[i].nodes().iter().cloned());
    }
    separators
}

/// The compiled structures of one template slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceTemplate {

    graph : MoralGraph,

    cliques : Vec<Clique>,

    separators : Vec<CliqueSeparator>

}

impl SliceTemplate {

    /// Moralizes, triangulates and assembles the junction tree of template slice s.
    pub fn build<T>(model : &T, slice : usize) -> Result<Self, ConstructionError>
    where
        T : Topology + ?Sized
    {
        let graph = moralize(model, slice)?;
        let mut cliques = eliminate(&graph)?;
        let separators = assemble(&mut cliques[..]);
        Ok(Self { graph, cliques, separators })
    }

    pub fn graph(&self) -> &MoralGraph {
        &self.graph
    }

    pub fn cliques(&self) -> &[Clique] {
        &self.cliques[..]
    }

    pub fn separators(&self) -> &[CliqueSeparator] {
        &self.separators[..]
    }

    /// petgraph view of the tree: node weights are clique indices, edge weights separator indices.
    pub fn tree_graph(&self) -> UnGraph<usize, usize> {
        let mut g = UnGraph::with_capacity(self.cliques.len(), self.separators.len());
        for ix in 0..self.cliques.len() {
            g.add_node(ix);
        }
        for (ix, sep) in self.separators.iter().enumerate() {
            g.add_edge(NodeIndex::new(sep.cliques.0), NodeIndex::new(sep.cliques.1), ix);
        }
        g
    }

    /// Clique indices along the tree path between two cliques (both included), or None
    /// if they are not connected.
    pub fn path(&self, from : usize, to : usize) -> Option<Vec<usize>> {
        if from == to {
            return Some(vec![from]);
        }
        let g = self.tree_graph();
        let path = all_simple_paths::<Vec<NodeIndex>, _>(&g, NodeIndex::new(from), NodeIndex::new(to), 0, None)
            .next()
            .map(|p| p.iter().map(|n| n.index() ).collect() );
        path
    }

    /// Verifies that every node shared by two connected cliques belongs to every clique on
    /// the path between them.
    pub fn has_running_intersection(&self) -> bool {
        for a in 0..self.cliques.len() {
            for b in (a+1)..self.cliques.len() {
                let shared : Vec<usize> = self.cliques[a].nodes().intersection(self.cliques[b].nodes()).cloned().collect();
                if shared.is_empty() {
                    continue;
                }
                match self.path(a, b) {
                    Some(path) => {
                        if !path.iter().all(|c| shared.iter().all(|n| self.cliques[*c].contains(*n) ) ) {
                            return false;
                        }
                    },
                    None => return false
                }
            }
        }
        true
    }

    /// Index of the first clique holding all the informed (variable, working slice) pairs.
    pub fn find_clique(&self, members : &[(VariableId, usize)]) -> Option<usize> {
        let ixs : Option<Vec<usize>> = members.iter()
            .map(|(v, s)| self.graph.position(*v, *s) )
            .collect();
        let ixs = ixs?;
        self.cliques.iter().position(|c| ixs.iter().all(|ix| c.contains(*ix) ) )
    }

}

/// Per template slice moral graph, minimal clique set and separators. The template must be
/// recompiled whenever the network structure changes: while stale, its contents cannot be
/// read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunctionTreeTemplate {

    slices : Vec<SliceTemplate>,

    stale : bool

}

impl Default for JunctionTreeTemplate {

    fn default() -> Self {
        Self { slices : Vec::new(), stale : true }
    }

}

impl JunctionTreeTemplate {

    /// Clears the compiled structures and marks the template stale.
    pub fn reset(&mut self) {
        self.slices.clear();
        self.stale = true;
    }

    pub fn set_stale(&mut self, stale : bool) {
        self.stale = stale;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Compiles every template slice of the model. On failure the template stays reset.
    pub fn compile<T>(&mut self, model : &T) -> Result<(), JunctionTreeError>
    where
        T : Topology + ?Sized
    {
        self.reset();
        let mut slices = Vec::with_capacity(model.n_slices());
        for s in 0..model.n_slices() {
            slices.push(SliceTemplate::build(model, s)?);
        }
        log::info!(
            "Compiled junction tree: {} slices, cliques per slice {:?}",
            slices.len(),
            slices.iter().map(|s| s.cliques.len() ).collect::<Vec<_>>()
        );
        self.slices = slices;
        self.stale = false;
        Ok(())
    }

    pub fn slices(&self) -> Result<&[SliceTemplate], JunctionTreeError> {
        if self.stale {
            return Err(JunctionTreeError::Stale);
        }
        Ok(&self.slices[..])
    }

    /// Template for the informed time slice (clamped to the last template).
    pub fn slice(&self, slice : usize) -> Result<&SliceTemplate, JunctionTreeError> {
        let slices = self.slices()?;
        if slices.is_empty() {
            return Err(JunctionTreeError::UnknownSlice(slice));
        }
        Ok(&slices[slice.min(slices.len() - 1)])
    }

}

#[cfg(test)]
use crate::model::{Network, VarType};

#[test]
fn assembles_chain() {
    let mut cliques = vec![
        Clique::new([1, 2].iter().cloned().collect(), false),
        Clique::new([0, 1].iter().cloned().collect(), false)
    ];
    let seps = assemble(&mut cliques[..]);
    assert_eq!(seps.len(), 1);
    assert_eq!(seps[0].nodes().iter().cloned().collect::<Vec<_>>(), vec![1]);
    assert_eq!(seps[0].cliques(), (0, 1));
    assert_eq!(cliques[0].neighbors(), &[1]);
}

#[test]
fn single_clique_has_no_separator() {
    let mut cliques = vec![Clique::new([0, 1].iter().cloned().collect(), false)];
    assert!(assemble(&mut cliques[..]).is_empty());
    assert!(assemble(&mut []).is_empty());
}

#[test]
fn stale_template_is_refused() {
    let mut net = Network::new(2);
    let x = net.add_variable("x", VarType::Discrete(2)).unwrap();
    let y = net.add_variable("y", VarType::Continuous).unwrap();
    net.add_edge(x, y, 0).unwrap();
    net.add_edge(x, x, 1).unwrap();
    net.add_edge(y, y, 1).unwrap();
    assert!(net.junction_template().slices().is_err());
    let tree = net.junction_tree().unwrap();
    for s in tree.slices().unwrap() {
        assert!(s.has_running_intersection());
        assert!(s.cliques().iter().any(|c| c.is_interface() ));
    }
    net.junction_template_mut().set_stale(true);
    match net.junction_template().slice(0) {
        Err(JunctionTreeError::Stale) => { },
        other => panic!("Expected stale template, found {:?}", other)
    }
}

#[test]
fn disjoint_cliques_stay_in_one_tree() {
    let mut cliques = vec![
        Clique::new([0, 1].iter().cloned().collect(), false),
        Clique::new([2, 3].iter().cloned().collect(), false)
    ];
    let seps = assemble(&mut cliques[..]);
    assert_eq!(seps.len(), 1);
    assert!(seps[0].nodes().is_empty());
    assert_eq!(seps[0].cliques(), (0, 1));
}
