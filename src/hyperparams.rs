//! Single immutable hyperparameter record, threaded explicitly from
//! `sample_trees` down through chain execution and weight construction.
//!
//! The original source mutates module-level globals from CLI args; per the
//! REDESIGN FLAG in spec §9 we pass one record down the call stack instead.

/// Tree-sampler proposal hyperparameters. Defaults match spec §4.3.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Hyperparams {
    /// Weight of the depth term in subtree selection.
    pub tau: f64,
    /// Weight of the mutrel-fit term in subtree selection. Proposal-only:
    /// never enters the MH acceptance score, which targets the phi
    /// log-likelihood alone (spec §4.3).
    pub rho: f64,
    /// Weight of `B_A` pairwise posterior mass in parent selection.
    pub theta: f64,
    /// Weight of depth_frac in parent selection.
    pub kappa: f64,
    /// How strongly peaked the depth-selection Beta-shaped weight is.
    pub psi: f64,
}

impl Default for Hyperparams {
    fn default() -> Self {
        Hyperparams {
            tau: 1.0,
            rho: 5.0,
            theta: 8.0,
            kappa: 1.0,
            psi: 3.0,
        }
    }
}
