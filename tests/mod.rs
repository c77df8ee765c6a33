use nalgebra::{DVector, DMatrix};
use rand::SeedableRng;
use rand::rngs::StdRng;
use approx::assert_relative_eq;
use std::collections::BTreeSet;
use dynbayes::distr::*;
use dynbayes::model::*;
use dynbayes::graph::*;
use dynbayes::learn::*;

const EPS : f64 = 1E-9;

fn d(var : usize) -> Dim {
    Dim::new(var, 0)
}

fn mixed_dbn() -> Network {
    let mut net = Network::new(2);
    let s = net.add_variable("s", VarType::Discrete(2)).unwrap();
    let c1 = net.add_variable("c1", VarType::Continuous).unwrap();
    let c2 = net.add_variable("c2", VarType::Continuous).unwrap();
    let e = net.add_variable("e", VarType::Discrete(3)).unwrap();
    net.add_edge(s, c1, 0).unwrap();
    net.add_edge(c1, c2, 0).unwrap();
    net.add_edge(c2, e, 0).unwrap();
    net.add_edge(s, s, 1).unwrap();
    net.add_edge(c1, c1, 1).unwrap();
    net.add_edge(e, c2, 1).unwrap();
    net
}

#[test]
fn junction_trees_have_running_intersection() {
    let mut net = mixed_dbn();
    let tree = net.junction_tree().unwrap();
    assert_eq!(tree.slices().unwrap().len(), 2);
    for slice in tree.slices().unwrap() {
        println!("{:?}", slice.cliques().iter().map(|c| c.members(slice.graph()) ).collect::<Vec<_>>());
        assert!(slice.has_running_intersection());
        assert_eq!(slice.separators().len() + 1, slice.cliques().len());
    }
}

#[test]
fn elimination_cliques_are_minimal() {
    let mut net = mixed_dbn();
    let tree = net.junction_tree().unwrap();
    for slice in tree.slices().unwrap() {
        let cliques : Vec<_> = slice.cliques().iter().filter(|c| !c.is_interface() ).collect();
        for a in cliques.iter() {
            for b in cliques.iter() {
                assert!(!a.is_proper_subset(b));
            }
        }
        let interface : BTreeSet<usize> = slice.graph().interface().into_iter().collect();
        let covered : BTreeSet<usize> = slice.cliques().iter()
            .filter(|c| c.is_interface() )
            .flat_map(|c| c.nodes().iter().cloned() )
            .collect();
        assert_eq!(interface, covered);
    }
}

#[test]
fn every_family_lies_in_a_clique() {
    let mut net = mixed_dbn();
    let parents : Vec<Vec<Edge>> = net.variables().iter().map(|v| v.parents().to_vec() ).collect();
    let tree = net.junction_tree().unwrap();
    for (s, slice) in tree.slices().unwrap().iter().enumerate() {
        for (var, edges) in parents.iter().enumerate() {
            let mut family = vec![(var, s)];
            family.extend(edges.iter().filter(|e| e.offset <= s ).map(|e| (e.var, s - e.offset) ));
            assert!(slice.find_clique(&family).is_some(), "Family of {} at slice {} split across cliques", var, s);
        }
    }
}

#[test]
fn chordal_graph_yields_its_maximal_cliques() {
    let nodes = (0..5).map(|v| GraphVariable::new(v, 0, true) ).collect();
    let mut g = MoralGraph::new(0, nodes);
    for (a, b) in [(0, 1), (0, 2), (1, 2), (1, 3), (2, 3), (3, 4)].iter() {
        g.connect(*a, *b);
    }
    let cliques : BTreeSet<Vec<usize>> = eliminate(&g).unwrap()
        .iter()
        .map(|c| c.nodes().iter().cloned().collect() )
        .collect();
    let expected : BTreeSet<Vec<usize>> = vec![vec![0, 1, 2], vec![1, 2, 3], vec![3, 4]].into_iter().collect();
    assert_eq!(cliques, expected);
}

#[test]
fn chain_scenario() {
    let mut net = Network::new(1);
    let x = net.add_variable("x", VarType::Discrete(2)).unwrap();
    let y = net.add_variable("y", VarType::Discrete(2)).unwrap();
    let z = net.add_variable("z", VarType::Discrete(2)).unwrap();
    net.add_edge(x, y, 0).unwrap();
    net.add_edge(y, z, 0).unwrap();
    let tree = net.junction_tree().unwrap();
    let slice = tree.slice(0).unwrap();
    let g = slice.graph();
    assert!(g.has_edge((x, 0), (y, 0)));
    assert!(g.has_edge((y, 0), (z, 0)));
    assert!(!g.has_edge((x, 0), (z, 0)));
    let members : BTreeSet<Vec<(usize, usize)>> = slice.cliques().iter().map(|c| c.members(g) ).collect();
    let expected : BTreeSet<Vec<(usize, usize)>> = vec![vec![(x, 0), (y, 0)], vec![(y, 0), (z, 0)]].into_iter().collect();
    assert_eq!(members, expected);
    assert_eq!(slice.separators().len(), 1);
    let sep : Vec<usize> = slice.separators()[0].nodes().iter().cloned().collect();
    assert_eq!(sep, vec![g.position(y, 0).unwrap()]);
    assert!(slice.find_clique(&[(x, 0), (y, 0)]).is_some());
    assert!(slice.find_clique(&[(x, 0), (z, 0)]).is_none());
}

#[test]
fn division_undoes_combination() {
    let a = Table::new(DiscreteDomain::new(vec![d(0)], vec![2]).unwrap(), DVector::from_vec(vec![0.3, 0.7])).unwrap();
    let b = Table::new(
        DiscreteDomain::new(vec![d(0), d(1)], vec![2, 3]).unwrap(),
        DVector::from_vec(vec![0.1, 0.2, 0.7, 0.5, 0.25, 0.25])
    ).unwrap();
    let ab = a.combine(&b).unwrap();
    let back = ab.divide(&b).unwrap();
    for x in 0..2 {
        for y in 0..3 {
            assert!((back.prob(&[x, y]) - a.prob(&[x])).abs() < EPS);
        }
    }
    let zero = Table::constant(b.domain().clone(), 0.);
    assert!(ab.divide(&zero).unwrap().probs().iter().all(|p| *p == 0. ));
}

#[test]
fn marginal_of_combination_recovers_operands() {
    let px = ConditionalDistribution::Gaussian(
        LinearGaussian::new(vec![d(0)], Vec::new(), Component::univariate(1., 2.)).unwrap()
    );
    let py_x = ConditionalDistribution::LinearGaussian(LinearGaussian::new(
        vec![d(1)],
        vec![d(0)],
        Component::new(DVector::from_element(1, 0.5), DMatrix::from_element(1, 1, 3.), DMatrix::from_element(1, 1, 1.)).unwrap()
    ).unwrap());
    let joint = px.combine(&py_x).unwrap();
    assert_eq!(joint.head(), &[d(0), d(1)]);
    assert!(joint.tail().is_empty());

    match joint.marginalize(&d(1)).unwrap() {
        ConditionalDistribution::Gaussian(lg) => {
            assert_relative_eq!(lg.component().intercept[0], 1., epsilon = EPS);
            assert_relative_eq!(lg.component().cov[(0, 0)], 2., epsilon = EPS);
        },
        other => panic!("Expected Gaussian, found {}", other)
    }
    match joint.marginalize(&d(0)).unwrap() {
        ConditionalDistribution::Gaussian(lg) => {
            assert_relative_eq!(lg.component().intercept[0], 3.5, epsilon = EPS);
            assert_relative_eq!(lg.component().cov[(0, 0)], 19., epsilon = EPS);
        },
        other => panic!("Expected Gaussian, found {}", other)
    }

    let pa = Table::new(DiscreteDomain::new(vec![d(0)], vec![2]).unwrap(), DVector::from_vec(vec![0.4, 0.6])).unwrap();
    let pb_a = Table::uniform_conditional(DiscreteDomain::new(vec![d(0), d(1)], vec![2, 4]).unwrap());
    let marg = pa.combine(&pb_a).unwrap().marginalize(&d(1)).unwrap();
    assert_eq!(marg.domain(), pa.domain());
    assert!((marg.probs() - pa.probs()).amax() < EPS);
}

#[test]
fn mixtures_sharing_a_switch_combine_directly() {
    let switch = DiscreteDomain::new(vec![d(0)], vec![2]).unwrap();
    let a = LinearGaussianMix::new(
        Table::new(switch.clone(), DVector::from_vec(vec![0.4, 0.6])).unwrap(),
        vec![d(1)],
        Vec::new(),
        vec![Component::univariate(-1., 1.), Component::univariate(1., 2.)]
    ).unwrap();
    let b = LinearGaussianMix::new(
        Table::constant(switch.clone(), 1.),
        vec![d(2)],
        Vec::new(),
        vec![Component::univariate(0., 3.), Component::univariate(5., 4.)]
    ).unwrap();
    let ab = a.combine(&b).unwrap();
    assert_eq!(ab.discrete(), &switch);
    assert_eq!(ab.head(), &[d(1), d(2)]);
    assert!(ab.tail().is_empty());
    assert!((ab.weights().prob(&[1]) - 0.6).abs() < EPS);
    let c = ab.component(&[1]);
    assert_relative_eq!(c.intercept[0], 1., epsilon = EPS);
    assert_relative_eq!(c.intercept[1], 5., epsilon = EPS);
    assert_relative_eq!(c.cov[(0, 1)], 0., epsilon = EPS);
    assert_relative_eq!(c.cov[(1, 1)], 4., epsilon = EPS);
}

#[test]
fn one_em_iteration_on_complete_binary_data() -> anyhow::Result<()> {
    let mut net = Network::new(1);
    let a = net.add_variable("A", VarType::Discrete(2))?;
    let b = net.add_variable("B", VarType::Discrete(2))?;
    net.add_edge(a, b, 0)?;
    let mut trials = TrialSet::new();
    for vb in [1, 0].iter() {
        let mut trial = Trial::new(1);
        trial.observe(a, 0, Value::State(0))?;
        trial.observe(b, 0, Value::State(*vb))?;
        trials.push(trial);
    }
    let opts = LearningOptions::from_json(r#"{ "MAX_ITERATIONS" : 1, "INFERENCE_ALGORITHM" : "enumeration" }"#)?;
    let report = ExpectMax::new().execute(&mut net, &trials, &opts, &mut ())?;
    assert_eq!(report.iterations, 1);
    match net.distribution(b, 0)? {
        ConditionalDistribution::Table(t) => {
            assert!((t.prob(&[0, 0]) - 0.5).abs() < EPS);
            assert!((t.prob(&[0, 1]) - 0.5).abs() < EPS);
        },
        other => panic!("Expected table, found {}", other)
    }
    Ok(())
}

fn mixture_network(p0 : f64, means : [f64; 2], vars : [f64; 2]) -> Network {
    let mut net = Network::new(1);
    let a = net.add_variable("a", VarType::Discrete(2)).unwrap();
    let y = net.add_variable("y", VarType::Continuous).unwrap();
    net.add_edge(a, y, 0).unwrap();
    let prior = Table::new(DiscreteDomain::new(vec![d(a)], vec![2]).unwrap(), DVector::from_vec(vec![p0, 1. - p0])).unwrap();
    net.set_distribution(a, 0, ConditionalDistribution::Table(prior)).unwrap();
    let mix = LinearGaussianMix::new(
        Table::constant(DiscreteDomain::new(vec![d(a)], vec![2]).unwrap(), 1.),
        vec![d(y)],
        Vec::new(),
        vec![Component::univariate(means[0], vars[0]), Component::univariate(means[1], vars[1])]
    ).unwrap();
    net.set_distribution(y, 0, ConditionalDistribution::GaussianMix(mix)).unwrap();
    net
}

#[test]
fn em_recovers_hidden_mixture() {
    let truth = mixture_network(0.3, [-2., 3.], [0.5, 1.]);
    let mut rng = StdRng::seed_from_u64(42);
    let mut trials = TrialSet::new();
    for _ in 0..500 {
        let mut trial = truth.sample_trial(&mut rng, 1).unwrap();
        trial.hide(0);
        trials.push(trial);
    }

    let mut net = mixture_network(0.5, [-1., 1.], [1., 1.]);
    let mut bar = indicatif::ProgressBar::hidden();
    let report = ExpectMax::new().execute(&mut net, &trials, &LearningOptions::default(), &mut bar).unwrap();
    assert_eq!(report.status, LearningStatus::Converged);
    assert!(report.skipped.is_empty());
    assert!(report.deltas.last().cloned().unwrap() <= 1e-4);
    let half = report.deltas.len() / 2;
    assert!(half > 0);
    let mean = |ds : &[f64]| ds.iter().sum::<f64>() / ds.len() as f64;
    assert!(mean(&report.deltas[..half]) >= mean(&report.deltas[half..]));

    match net.distribution(0, 0).unwrap() {
        ConditionalDistribution::Table(t) => assert_relative_eq!(t.prob(&[0]), 0.3, epsilon = 0.06),
        other => panic!("Expected table, found {}", other)
    }
    match net.distribution(1, 0).unwrap() {
        ConditionalDistribution::GaussianMix(m) => {
            assert_relative_eq!(m.component(&[0]).intercept[0], -2., epsilon = 0.25);
            assert_relative_eq!(m.component(&[1]).intercept[0], 3., epsilon = 0.25);
            assert_relative_eq!(m.component(&[0]).cov[(0, 0)], 0.5, epsilon = 0.2);
            assert_relative_eq!(m.component(&[1]).cov[(0, 0)], 1., epsilon = 0.3);
        },
        other => panic!("Expected mixture, found {}", other)
    }
}

#[test]
fn em_learns_transition_of_observed_chain() {
    let mut truth = Network::new(2);
    let x = truth.add_variable("x", VarType::Discrete(2)).unwrap();
    let y = truth.add_variable("y", VarType::Continuous).unwrap();
    truth.add_edge(x, x, 1).unwrap();
    truth.add_edge(x, y, 0).unwrap();
    let mut model = Network::new(2);
    model.add_variable("x", VarType::Discrete(2)).unwrap();
    model.add_variable("y", VarType::Continuous).unwrap();
    model.add_edge(x, x, 1).unwrap();
    model.add_edge(x, y, 0).unwrap();

    let transition = Table::new(
        DiscreteDomain::new(vec![Dim::new(x, -1), Dim::new(x, 0)], vec![2, 2]).unwrap(),
        DVector::from_vec(vec![0.9, 0.1, 0.2, 0.8])
    ).unwrap();
    truth.set_distribution(x, 1, ConditionalDistribution::Table(transition)).unwrap();
    for s in 0..2 {
        let emission = LinearGaussianMix::new(
            Table::constant(DiscreteDomain::new(vec![d(x)], vec![2]).unwrap(), 1.),
            vec![d(y)],
            Vec::new(),
            vec![Component::univariate(0., 1.), Component::univariate(4., 1.)]
        ).unwrap();
        truth.set_distribution(y, s, ConditionalDistribution::GaussianMix(emission)).unwrap();
    }

    let mut rng = StdRng::seed_from_u64(7);
    let trials : Vec<Trial> = (0..200).map(|_| truth.sample_trial(&mut rng, 4).unwrap() ).collect();
    let report = ExpectMax::new().execute(&mut model, &TrialSet::from(trials), &LearningOptions::default(), &mut ()).unwrap();
    assert_eq!(report.status, LearningStatus::Converged);
    assert_eq!(report.iterations, 2);

    match model.distribution(x, 1).unwrap() {
        ConditionalDistribution::Table(t) => {
            assert_relative_eq!(t.prob(&[0, 0]), 0.9, epsilon = 0.1);
            assert_relative_eq!(t.prob(&[1, 1]), 0.8, epsilon = 0.1);
        },
        other => panic!("Expected table, found {}", other)
    }
    match model.distribution(y, 1).unwrap() {
        ConditionalDistribution::GaussianMix(m) => {
            assert_relative_eq!(m.component(&[1]).intercept[0], 4., epsilon = 0.3);
        },
        other => panic!("Expected mixture, found {}", other)
    }
}
