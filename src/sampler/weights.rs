//! Proposal weight builders for the tree sampler's move operator.
//!
//! Both weight vectors are tree-dependent, unlike a naive uniform proposal:
//! `w_subtree` favors nodes the current tree's implied mutrel tensor fits
//! poorly against the data (so badly-placed nodes get perturbed more
//! often) and favors nodes at a depth that shifts over the course of a run
//! (shallow early, deep late); `w_parents` favors candidates the data
//! mutrel tensor thinks are ancestral to the subtree, and candidates at a
//! depth the `kappa`/`psi` terms make more attractive. Because both depend
//! on the current adjacency matrix, the Metropolis-Hastings
//! proposal-asymmetry correction must evaluate both directions' weights
//! against their respective trees (see `sampler::chain::propose_and_accept`).

use ndarray::{Array1, Array2};
use rand::Rng;

use crate::model::adjacency::calc_depth_frac;
use crate::model::mutrel::{make_mutrel_tensor_from_cluster_adj, MutRel, RelType};

const FLOOR: f64 = 1e-3;
const MIN_DEPTH: f64 = 0.01;
const MAX_DEPTH: f64 = 0.99;

/// The Beta-shaped depth preference `_make_W_subtree` anneals over a run:
/// `A = psi*progress + 1`, `B = psi*(1-progress) + 1`, `depth_frac` clamped
/// away from 0/1 so both exponents stay finite. At `progress = 0` this
/// favors shallow nodes (small moves near the root first); at `progress = 1`
/// it favors deep nodes, shifting smoothly as the chain runs.
fn beta_depth_term(depth_frac: f64, psi: f64, progress: f64) -> f64 {
    let d = depth_frac.max(MIN_DEPTH).min(MAX_DEPTH);
    let a_minus_one = psi * progress;
    let b_minus_one = psi * (1.0 - progress);
    d.powf(a_minus_one) * (1.0 - d).powf(b_minus_one)
}

/// Proposal over which node is the moved subtree. Combines a progress-
/// dependent depth term (`tau`, peakedness `psi`) with a mutrel-fit term
/// (`rho`): a node whose pairwise relations to everything else are poorly
/// explained by the current tree gets a higher chance of being picked for a
/// move. `FLOOR` keeps every non-root node reachable, which an MCMC
/// proposal needs for irreducibility. `progress` is the chain's fraction
/// (0 at the first iteration, 1 at the last) through its total iteration
/// budget.
pub fn w_subtree(adj: &Array2<u8>, data_mutrel: &MutRel, vids: &[String], tau: f64, rho: f64, psi: f64, progress: f64) -> Array1<f64> {
    let k = adj.nrows();
    let depth = calc_depth_frac(adj);
    let tree_mutrel = make_mutrel_tensor_from_cluster_adj(adj, vids);
    let (_, per_node_fit) = data_mutrel.fit_against(&tree_mutrel);

    let mut w = Array1::<f64>::zeros(k);
    for i in 1..k {
        let depth_term = beta_depth_term(depth[i], psi, progress);
        let weights_fit = per_node_fit[i - 1].max(1e-5);
        w[i] = FLOOR + tau * depth_term + rho * weights_fit;
    }
    normalize(w)
}

/// Proposal over candidate new parents for `subtree`: a depth term
/// (`kappa`, peakedness `psi`) plus a `theta`-scaled bias toward nodes the
/// data mutrel tensor thinks are ancestral to `subtree`
/// (`mutrel.rels[subtree-1, node-1, BBeforeA]`, "node before subtree"). The
/// root always gets only the depth term (depth 0) plus `FLOOR`, since it has
/// no mutrel row. Normalized to sum to 1, with `subtree`'s own entry zeroed.
pub fn w_parents(subtree: usize, adj: &Array2<u8>, mutrel: &MutRel, theta: f64, kappa: f64, psi: f64) -> Array1<f64> {
    let k = adj.nrows();
    assert_eq!(mutrel.k(), k - 1, "mutrel tensor must cover the k-1 non-root nodes");
    assert!(subtree > 0 && subtree < k);
    let depth = calc_depth_frac(adj);

    let mut w = Array1::<f64>::zeros(k);
    for node in 0..k {
        if node == subtree {
            continue;
        }
        let depth_term = depth[node].powf(psi);
        let bias = if node == 0 {
            0.0
        } else {
            theta * mutrel.rels[[subtree - 1, node - 1, RelType::BBeforeA.index()]]
        };
        w[node] = FLOOR + kappa * depth_term + bias;
    }
    normalize(w)
}

fn normalize(mut w: Array1<f64>) -> Array1<f64> {
    let total: f64 = w.sum();
    assert!(total > 0.0, "proposal weight vector must have positive mass");
    w.mapv_inplace(|x| x / total);
    w
}

/// Sample a categorical index from an unnormalized or normalized weight
/// vector. Panics if every weight is zero or negative.
pub fn sample_categorical<R: Rng + ?Sized>(weights: &Array1<f64>, rng: &mut R) -> usize {
    let total: f64 = weights.sum();
    assert!(total > 0.0, "cannot sample from an all-zero weight vector");
    let mut threshold = rng.gen::<f64>() * total;
    for (i, &w) in weights.iter().enumerate() {
        if threshold < w {
            return i;
        }
        threshold -= w;
    }
    weights.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::adjacency::init_branching;
    use crate::model::mutrel::{MutRel as MR, NUM_REL_TYPES};
    use ndarray::Array3;

    fn flat_mutrel(m: usize) -> MR {
        let mut rels = Array3::<f64>::zeros((m, m, NUM_REL_TYPES));
        for i in 0..m {
            rels[[i, i, RelType::Cocluster.index()]] = 1.0;
        }
        for i in 0..m {
            for j in 0..m {
                if i != j {
                    rels[[i, j, RelType::DiffBranch.index()]] = 1.0;
                }
            }
        }
        MR { rels, vids: (0..m).map(|i| format!("S{}", i)).collect() }
    }

    #[test]
    fn w_subtree_excludes_root_and_sums_to_one() {
        let adj = init_branching(4);
        let vids = vec!["root".into(), "S0".into(), "S1".into(), "S2".into()];
        let mutrel = flat_mutrel(3);
        let w = w_subtree(&adj, &mutrel, &vids, 1.0, 5.0, 3.0, 0.5);
        assert_eq!(w[0], 0.0);
        assert!((w.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn w_parents_excludes_subtree_and_sums_to_one() {
        let adj = init_branching(4);
        let mutrel = flat_mutrel(3);
        let w = w_parents(1, &adj, &mutrel, 8.0, 1.0, 3.0);
        assert_eq!(w[1], 0.0);
        assert!((w.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn strong_bbeforea_signal_dominates_the_proposal() {
        let adj = init_branching(4);
        let mut rels = Array3::<f64>::zeros((3, 3, NUM_REL_TYPES));
        for i in 0..3 {
            rels[[i, i, RelType::Cocluster.index()]] = 1.0;
        }
        rels[[0, 0, RelType::Cocluster.index()]] = 0.0;
        rels[[0, 1, RelType::BBeforeA.index()]] = 0.99;
        let mutrel = MR { rels, vids: vec!["S0".into(), "S1".into(), "S2".into()] };

        let w = w_parents(1, &adj, &mutrel, 8.0, 1.0, 3.0);
        assert!(w[2] > w[3], "node 2 should dominate node 3 as a proposed parent for subtree 1");
    }

    #[test]
    fn w_subtree_shifts_from_shallow_to_deep_as_progress_advances() {
        use crate::model::adjacency::init_linear;

        // root(0) -> 1 -> 2 -> 3: strictly increasing depth_frac.
        let adj = init_linear(4);
        let vids = vec!["root".into(), "S0".into(), "S1".into(), "S2".into()];
        let mutrel = flat_mutrel(3);

        let w_early = w_subtree(&adj, &mutrel, &vids, 5.0, 0.0, 3.0, 0.0);
        let w_late = w_subtree(&adj, &mutrel, &vids, 5.0, 0.0, 3.0, 1.0);

        assert!(w_early[1] > w_early[3], "early in the run the shallow node should dominate");
        assert!(w_late[3] > w_late[1], "late in the run the deep node should dominate");
    }

    #[test]
    fn sample_categorical_respects_a_one_hot_distribution() {
        let mut w = Array1::<f64>::zeros(4);
        w[2] = 1.0;
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            assert_eq!(sample_categorical(&w, &mut rng), 2);
        }
    }
}
