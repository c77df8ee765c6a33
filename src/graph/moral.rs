use super::*;
use crate::model::Topology;

/// Builds the moral graph of template slice s.
///
/// The graph holds every variable at slice s, plus every variable instance at a past
/// working slice w whose children reach slice s or beyond. An instance is part of the
/// forward interface when it has a child after s. Parents of the present variables are
/// connected to their children and married among themselves; the incoming interface (all
/// past instances) and the forward interface are made complete. Finally, discrete
/// instances joined by a path of continuous instances are connected, as required by
/// strong junction trees over mixed networks.
pub fn moralize<T>(model : &T, slice : usize) -> Result<MoralGraph, ConstructionError>
where
    T : Topology + ?Sized
{
    let vars = model.variables();
    let mut nodes = Vec::new();
    for v in vars {
        for w in 0..=slice {
            let reaches = v.children().iter().any(|e| w + e.offset >= slice );
            if w == slice || reaches {
                let mut node = GraphVariable::new(v.id(), w, v.is_discrete());
                node.in_interface = v.children().iter().any(|e| w + e.offset > slice );
                nodes.push(node);
            }
        }
    }
    let mut graph = MoralGraph::new(slice, nodes);

    for v in vars {
        let child = graph.position(v.id(), slice).ok_or(ConstructionError::UnknownVariable(v.id()))?;
        let mut need_marrying = Vec::new();
        for e in v.parents().iter().filter(|e| e.offset <= slice ) {
            let parent = graph.position(e.var, slice - e.offset)
                .ok_or(ConstructionError::UnknownVariable(e.var))?;
            graph.add_parent(child, parent);
            need_marrying.push(parent);
        }
        graph.connect_all(&need_marrying[..]);
    }

    let incoming : Vec<usize> = (0..graph.len()).filter(|ix| graph.node(*ix).slice < slice ).collect();
    graph.connect_all(&incoming[..]);

    let interface = graph.interface();
    let expected = model.interface_size(slice);
    if interface.len() != expected {
        log::error!(
            "Moralization of slice {} found {} interface variables ({} expected)",
            slice,
            interface.len(),
            expected
        );
        return Err(ConstructionError::InterfaceMismatch { slice, expected, found : interface.len() });
    }
    graph.connect_all(&interface[..]);

    marry_discrete_on_continuous_path(&mut graph);
    graph.reset_cut_variables();
    log::debug!("Moral graph of slice {}: {} nodes, {} edges", slice, graph.len(), graph.edges().len());
    Ok(graph)
}

/// Connects every set of discrete nodes that is reachable through the same connected
/// set of continuous nodes. Continuous nodes are marked cut as they are visited.
fn marry_discrete_on_continuous_path(graph : &mut MoralGraph) {
    for start in 0..graph.len() {
        if graph.node(start).discrete || graph.node(start).cut {
            continue;
        }
        let mut endpoints = BTreeSet::new();
        let mut stack = vec![start];
        graph.node_mut(start).cut = true;
        while let Some(ix) = stack.pop() {
            let nbrs : Vec<usize> = graph.node(ix).neighbors().iter().cloned().collect();
            for n in nbrs {
                if graph.node(n).discrete {
                    endpoints.insert(n);
                } else if !graph.node(n).cut {
                    graph.node_mut(n).cut = true;
                    stack.push(n);
                }
            }
        }
        if endpoints.len() > 1 {
            let endpoints : Vec<usize> = endpoints.into_iter().collect();
            log::trace!("Marrying discrete nodes {:?} across continuous path", endpoints);
            graph.connect_all(&endpoints[..]);
        }
    }
}

#[cfg(test)]
use crate::model::{Network, VarType, RandomVariable};

/// Wraps a network while reporting a fixed interface size.
#[cfg(test)]
struct FixedInterface(Network, usize);

#[cfg(test)]
impl Topology for FixedInterface {

    fn variables(&self) -> &[RandomVariable] {
        self.0.variables()
    }

    fn n_slices(&self) -> usize {
        self.0.n_slices()
    }

    fn interface_size(&self, _slice : usize) -> usize {
        self.1
    }

}

#[test]
fn chain_has_no_moral_edge() {
    let mut net = Network::new(1);
    let x = net.add_variable("x", VarType::Discrete(2)).unwrap();
    let y = net.add_variable("y", VarType::Discrete(2)).unwrap();
    let z = net.add_variable("z", VarType::Discrete(2)).unwrap();
    net.add_edge(x, y, 0).unwrap();
    net.add_edge(y, z, 0).unwrap();
    let g = moralize(&net, 0).unwrap();
    assert_eq!(g.len(), 3);
    assert!(g.has_edge((x, 0), (y, 0)));
    assert!(g.has_edge((y, 0), (z, 0)));
    assert!(!g.has_edge((x, 0), (z, 0)));
}

#[test]
fn co_parents_are_married() {
    let mut net = Network::new(1);
    let a = net.add_variable("a", VarType::Discrete(2)).unwrap();
    let b = net.add_variable("b", VarType::Continuous).unwrap();
    let c = net.add_variable("c", VarType::Continuous).unwrap();
    net.add_edge(a, c, 0).unwrap();
    net.add_edge(b, c, 0).unwrap();
    let g = moralize(&net, 0).unwrap();
    assert!(g.has_edge((a, 0), (b, 0)));
    assert_eq!(g.node(g.position(c, 0).unwrap()).parents(), &[0, 1]);
}

#[test]
fn discrete_nodes_on_continuous_path_are_married() {
    // d1 -> c1 -> c2 -> d3: d1 and d3 only meet through continuous nodes.
    let mut net = Network::new(1);
    let d1 = net.add_variable("d1", VarType::Discrete(2)).unwrap();
    let c1 = net.add_variable("c1", VarType::Continuous).unwrap();
    let c2 = net.add_variable("c2", VarType::Continuous).unwrap();
    let d3 = net.add_variable("d3", VarType::Discrete(2)).unwrap();
    net.add_edge(d1, c1, 0).unwrap();
    net.add_edge(c1, c2, 0).unwrap();
    net.add_edge(c2, d3, 0).unwrap();
    let g = moralize(&net, 0).unwrap();
    assert!(g.has_edge((d1, 0), (d3, 0)));
    assert!(!g.has_cut_variables());
}

#[test]
fn temporal_interface() {
    // x[t-1] -> x[t], x[t] -> y[t]
    let mut net = Network::new(2);
    let x = net.add_variable("x", VarType::Discrete(2)).unwrap();
    let y = net.add_variable("y", VarType::Discrete(2)).unwrap();
    net.add_edge(x, x, 1).unwrap();
    net.add_edge(x, y, 0).unwrap();
    let g0 = moralize(&net, 0).unwrap();
    assert_eq!(g0.interface().len(), 1);
    let g1 = moralize(&net, 1).unwrap();
    assert_eq!(g1.len(), 3);
    assert!(g1.has_edge((x, 0), (x, 1)));
    assert!(g1.node(g1.position(x, 1).unwrap()).in_interface);
    assert!(!g1.node(g1.position(x, 0).unwrap()).in_interface);
}

#[test]
fn interface_count_is_checked() {
    let mut net = Network::new(2);
    let x = net.add_variable("x", VarType::Discrete(2)).unwrap();
    net.add_edge(x, x, 1).unwrap();
    let topology = FixedInterface(net, 7);
    match moralize(&topology, 0) {
        Err(ConstructionError::InterfaceMismatch { slice, expected, found }) => {
            assert_eq!((slice, expected, found), (0, 7, 1));
        },
        other => panic!("Expected interface mismatch, found {:?}", other)
    }
    assert!(moralize(&FixedInterface(topology.0, 1), 0).is_ok());
}
