/// Distributions over hybrid (discrete and continuous) domains: probability tables,
/// linear-Gaussian regressions and their mixtures, softmax regressions, and the algebra
/// (combination, marginalization, complement) used to build joint distributions from them.
pub mod distr;

/// Dynamic Bayesian networks: variables, lagged dependencies, template distributions and
/// trial evidence.
pub mod model;

/// Moralization, triangulation and junction tree assembly for each template slice of a
/// dynamic network.
pub mod graph;

/// Contract between learning and inference, and an exact inference algorithm for small networks.
pub mod infer;

// Parameter learning by expectation-maximization.
pub mod learn;
