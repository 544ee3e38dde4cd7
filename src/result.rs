//! The host-facing output bundle (spec §6): every post-burnin, thinned tree
//! sample plus the run's metadata, serializable for the CLI's `--output`
//! path.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::hyperparams::Hyperparams;
use crate::model::phi::Phi;

/// One retained tree sample: its adjacency structure, its fitted `phi`
/// matrix, and the phi log-likelihood that scored it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSample {
    pub adj: Array2<u8>,
    pub phi: Array2<f64>,
    pub llh: f64,
}

impl TreeSample {
    pub fn new(adj: Array2<u8>, phi: Phi, llh: f64) -> Self {
        TreeSample { adj, phi: phi.0, llh }
    }
}

/// Everything a run of the sampler produces, across all chains (spec §6).
/// Samples are already post-burnin and thinned; chains are concatenated in
/// chain order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultBundle {
    pub supercluster_vids: Vec<String>,
    pub hyperparams: Hyperparams,
    pub nchains: usize,
    pub base_seed: u64,
    pub samples: Vec<TreeSample>,
}

impl ResultBundle {
    pub fn best(&self) -> Option<&TreeSample> {
        self.samples
            .iter()
            .max_by(|a, b| a.llh.partial_cmp(&b.llh).expect("llh must never be NaN"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::adjacency::init_branching;
    use ndarray::Array2 as NdArray2;

    #[test]
    fn best_picks_the_highest_llh_sample() {
        let adj = init_branching(2);
        let phi = NdArray2::<f64>::from_elem((2, 1), 1.0);
        let bundle = ResultBundle {
            supercluster_vids: vec!["S0".into()],
            hyperparams: Hyperparams::default(),
            nchains: 1,
            base_seed: 0,
            samples: vec![
                TreeSample { adj: adj.clone(), phi: phi.clone(), llh: -10.0 },
                TreeSample { adj: adj.clone(), phi: phi.clone(), llh: -3.0 },
                TreeSample { adj, phi, llh: -7.0 },
            ],
        };
        assert_eq!(bundle.best().unwrap().llh, -3.0);
    }
}
