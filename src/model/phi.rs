//! Subclone-frequency (phi) matrices and the binomial likelihood that scores
//! them against observed read counts.

use ndarray::{Array2, Axis};
use statrs::distribution::{Binomial, Discrete};

use crate::model::adjacency;

/// `K x S` subclone frequency matrix. `phi[0,:] == 1` (the root is always
/// fully present); for every internal node and sample, `phi[k,s] >=
/// sum(phi[children(k), s])` (the sum condition, spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct Phi(pub Array2<f64>);

impl Phi {
    pub fn k(&self) -> usize {
        self.0.nrows()
    }

    pub fn nsamples(&self) -> usize {
        self.0.ncols()
    }

    /// Checks `phi[0,:] == 1` exactly and the sum condition to the 1e-6
    /// tolerance spec §4.2 requires. Panics on violation: this is an
    /// invariant, not a recoverable condition.
    pub fn assert_invariants(&self, adj: &Array2<u8>) {
        let k = self.k();
        assert_eq!(adj.nrows(), k);
        for s in 0..self.nsamples() {
            assert!(
                (self.0[[0, s]] - 1.0).abs() < 1e-12,
                "phi[0,{}] must be exactly 1, got {}",
                s,
                self.0[[0, s]]
            );
        }

        for parent in 0..k {
            let children: Vec<usize> = (0..k)
                .filter(|&c| c != parent && adj[[parent, c]] == 1)
                .collect();
            if children.is_empty() {
                continue;
            }
            for s in 0..self.nsamples() {
                let child_sum: f64 = children.iter().map(|&c| self.0[[c, s]]).sum();
                assert!(
                    self.0[[parent, s]] + 1e-6 >= child_sum,
                    "sum condition violated at node {} sample {}: phi={} children sum to {}",
                    parent,
                    s,
                    self.0[[parent, s]],
                    child_sum
                );
            }
        }
    }
}

/// Clamp `p` into `[eps, 1-eps]`, as every VAF fed to the binomial
/// likelihood must be (spec §4.2 epsilon = 1e-5).
pub fn clip(p: f64, eps: f64) -> f64 {
    p.max(eps).min(1.0 - eps)
}

/// `log Binom(v | n, p)`, clamping `p` into `[eps, 1-eps]` first to avoid
/// `log(0)`.
pub fn log_binomial_pmf(v: u32, n: u32, p: f64, eps: f64) -> f64 {
    let p = clip(p, eps);
    let binom = Binomial::new(p, n as u64).expect("n and p must be within Binomial's domain");
    binom.ln_pmf(v as u64)
}

/// `sum_{k>0,s} log Binom(V_ks | N_ks, clip(omega_ks * phi_ks))`: the
/// phi-likelihood the MH sampler's acceptance ratio targets (spec §4.2,
/// §4.3). Asserts `phi[0,:] == 1` and that the result is finite; both are
/// invariant-violation classes per §7, not recoverable conditions.
pub fn calc_llh_phi(phi: &Phi, v: &Array2<u32>, n: &Array2<u32>, omega: &Array2<f64>) -> f64 {
    const EPSILON: f64 = 1e-5;
    let k = phi.k();
    let s = phi.nsamples();
    assert_eq!(v.shape(), &[k - 1, s]);
    assert_eq!(n.shape(), &[k - 1, s]);
    assert_eq!(omega.shape(), &[k - 1, s]);
    for col in 0..s {
        assert!((phi.0[[0, col]] - 1.0).abs() < 1e-12);
    }

    let mut llh = 0.0;
    for row in 0..k - 1 {
        for col in 0..s {
            let p = omega[[row, col]] * phi.0[[row + 1, col]];
            llh += log_binomial_pmf(v[[row, col]], n[[row, col]], p, EPSILON);
        }
    }
    assert!(llh.is_finite(), "phi log-likelihood must be finite, got {}", llh);
    llh
}

/// Build the eta -> phi ancestor-sum matrix `E` (lower-triangular under a
/// topological order) such that `phi = E . eta`: `E[k, c] = 1` iff `c == k`
/// or `c` is a descendant of `k`. `phi[k,s] = eta[k,s] + sum(phi[children])`
/// unrolls into `phi[k,s] = sum_{d in subtree(k)} eta[d,s]`.
pub fn ancestor_sum_matrix(adj: &Array2<u8>) -> Array2<f64> {
    let k = adj.nrows();
    let anc = adjacency::make_ancestral_from_adj(adj);
    let mut e = Array2::<f64>::zeros((k, k));
    for row in 0..k {
        e[[row, row]] = 1.0;
        for col in 0..k {
            if anc[[row, col]] == 1 {
                e[[row, col]] = 1.0;
            }
        }
    }
    e
}

/// `phi = E . eta`, and set `phi[0,:] = 1` exactly (the root's eta is
/// whatever reparameterisation produced, but phi's root row is pinned).
pub fn eta_to_phi(adj: &Array2<u8>, eta: &Array2<f64>) -> Phi {
    let e = ancestor_sum_matrix(adj);
    let mut phi = e.dot(eta);
    let s = phi.ncols();
    for col in 0..s {
        phi[[0, col]] = 1.0;
    }
    Phi(phi)
}

/// Sum over each node's subtree, used when checking phi against observed
/// frequencies in tests (`parent >= sum(children)` restated as a subtree
/// total never exceeding the parent's own phi value).
pub fn subtree_phi_sum(adj: &Array2<u8>, phi: &Phi, node: usize) -> Array2<f64> {
    let k = adj.nrows();
    let anc = adjacency::make_ancestral_from_adj(adj);
    let s = phi.nsamples();
    let mut total = Array2::<f64>::zeros((1, s));
    for d in 0..k {
        if d == node || anc[[node, d]] == 1 {
            for col in 0..s {
                total[[0, col]] += phi.0[[d, col]];
            }
        }
    }
    total
}

/// Sum children's phi along axis 0 for every node in one pass; a small
/// helper used by the projection-based solvers to evaluate the sum-condition
/// residual without re-deriving the ancestor matrix per iteration.
pub fn children_phi_sum(adj: &Array2<u8>, phi: &Array2<f64>) -> Array2<f64> {
    let k = adj.nrows();
    let s = phi.ncols();
    let mut sums = Array2::<f64>::zeros((k, s));
    for parent in 0..k {
        for child in 0..k {
            if child != parent && adj[[parent, child]] == 1 {
                let child_row = phi.index_axis(Axis(0), child).to_owned();
                for col in 0..s {
                    sums[[parent, col]] += child_row[col];
                }
            }
        }
    }
    sums
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::adjacency::init_branching;

    #[test]
    fn clip_respects_bounds() {
        assert_eq!(clip(-1.0, 1e-5), 1e-5);
        assert_eq!(clip(2.0, 1e-5), 1.0 - 1e-5);
        assert!((clip(0.5, 1e-5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn eta_to_phi_respects_sum_condition() {
        let adj = init_branching(4);
        let eta = Array2::from_shape_vec((4, 2), vec![1.0, 1.0, 0.3, 0.2, 0.3, 0.3, 0.2, 0.3]).unwrap();
        let phi = eta_to_phi(&adj, &eta);
        phi.assert_invariants(&adj);
    }

    #[test]
    fn log_binomial_pmf_is_maximized_at_the_mle() {
        let at_mle = log_binomial_pmf(50, 100, 0.5, 1e-5);
        let off_mle = log_binomial_pmf(50, 100, 0.1, 1e-5);
        assert!(at_mle > off_mle);
    }
}
