//! Reconstructs tumor clonal evolution trees from bulk sequencing SSM read
//! counts: a data-driven pairwise relation tensor feeds a Metropolis-Hastings
//! tree sampler, which jointly searches tree topologies and fits per-sample
//! subclone frequencies against the observed read counts (spec §1, §2).

pub mod cli;
pub mod errors;
pub mod hyperparams;
pub mod model;
pub mod pairwise;
pub mod phi_fitter;
pub mod result;
pub mod rng;
pub mod sampler;
