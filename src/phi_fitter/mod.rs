//! Subclone-frequency fitting: given a tree structure and observed read
//! counts, find the `phi` matrix that maximizes the binomial log-likelihood
//! subject to the sum condition (spec §4.2).
//!
//! All four solvers share the same `eta` reparameterization: `phi = E .
//! eta` where `E` is the tree's ancestor-sum matrix (`model::phi::
//! ancestor_sum_matrix`). Under this change of variables the sum condition
//! (`phi[parent] >= sum(phi[children])`) holds automatically whenever
//! `eta >= 0`, so the two "projection" solvers below need only clamp `eta`
//! to be nonnegative after each step rather than solve a constrained
//! optimization directly.

pub mod graddesc;
pub mod projection;
pub mod proj_rprop;
pub mod rprop;

use ndarray::Array2;

use crate::model::phi::Phi;

/// A method for fitting `phi` to observed read counts under a fixed tree
/// structure. The second return value is the sum-condition slack
/// (`phi[parent] - sum(phi[children])`, per node and sample): nonnegative
/// everywhere the 1e-6 tolerance (spec §4.2) is met, a diagnostic a caller
/// can inspect without re-deriving the ancestor structure.
pub trait PhiFitter {
    fn fit(&self, adj: &Array2<u8>, v: &Array2<u32>, n: &Array2<u32>, omega: &Array2<f64>) -> (Phi, Array2<f64>);
}

/// The four solvers named in spec §4.2, dispatched by CLI flag / config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhiMethod {
    GradDesc,
    Rprop,
    Projection,
    ProjRprop,
}

impl PhiMethod {
    pub fn build(self, max_iters: usize, step_size: f64) -> Box<dyn PhiFitter> {
        match self {
            PhiMethod::GradDesc => Box::new(graddesc::GradDesc { max_iters, step_size }),
            PhiMethod::Rprop => Box::new(rprop::Rprop::new(max_iters, step_size)),
            PhiMethod::Projection => Box::new(projection::Projection { max_iters, step_size }),
            PhiMethod::ProjRprop => Box::new(proj_rprop::ProjRprop::new(max_iters, step_size)),
        }
    }
}

/// `d/dphi[k,s] log Binom(v | n, clip(omega*phi))`, zeroed at the root row
/// (the root's phi is pinned to 1 and is never optimized over). Shared by
/// every solver.
pub(crate) fn grad_llh_phi(phi: &Array2<f64>, v: &Array2<u32>, n: &Array2<u32>, omega: &Array2<f64>) -> Array2<f64> {
    const EPSILON: f64 = 1e-5;
    let k = phi.nrows();
    let s = phi.ncols();
    let mut grad = Array2::<f64>::zeros((k, s));
    for row in 0..k - 1 {
        for col in 0..s {
            let raw_p = omega[[row, col]] * phi[[row + 1, col]];
            let p = crate::model::phi::clip(raw_p, EPSILON);
            let vv = v[[row, col]] as f64;
            let nn = n[[row, col]] as f64;
            let d_llh_dp = vv / p - (nn - vv) / (1.0 - p);
            grad[[row + 1, col]] = omega[[row, col]] * d_llh_dp;
        }
    }
    grad
}

/// `dL/deta = E^T . dL/dphi`, the chain rule through the `phi = E . eta`
/// reparameterization.
pub(crate) fn grad_llh_eta(adj: &Array2<u8>, phi: &Array2<f64>, v: &Array2<u32>, n: &Array2<u32>, omega: &Array2<f64>) -> Array2<f64> {
    let e = crate::model::phi::ancestor_sum_matrix(adj);
    let grad_phi = grad_llh_phi(phi, v, n, omega);
    e.t().dot(&grad_phi)
}

/// Re-derive `phi` from `eta` and compute its sum-condition slack.
pub(crate) fn finish(adj: &Array2<u8>, eta: &Array2<f64>) -> (Phi, Array2<f64>) {
    let phi = crate::model::phi::eta_to_phi(adj, eta);
    let children_sum = crate::model::phi::children_phi_sum(adj, &phi.0);
    let slack = &phi.0 - &children_sum;
    (phi, slack)
}

/// Initial `eta`: evenly split each node's phi budget so the sum condition
/// holds trivially at iteration zero.
pub(crate) fn init_eta(k: usize, s: usize) -> Array2<f64> {
    Array2::<f64>::from_elem((k, s), 1.0 / k as f64)
}

/// Softplus, used by `graddesc`/`rprop` to reparameterize `eta >= 0` as an
/// unconstrained optimization variable (spec §4.2): `eta = softplus(raw)`.
/// Linear past `x = 30` to avoid needlessly overflowing `exp`.
pub(crate) fn softplus(x: f64) -> f64 {
    if x > 30.0 {
        x
    } else {
        (1.0 + x.exp()).ln()
    }
}

/// Inverse of `softplus`, used once to seed the unconstrained variable from
/// `init_eta`'s nonnegative starting point.
pub(crate) fn softplus_inv(y: f64) -> f64 {
    (y.exp() - 1.0).ln()
}

/// Derivative of `softplus`, i.e. the logistic sigmoid; the chain-rule factor
/// between a gradient in `eta`-space and the same gradient in `raw`-space.
pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::adjacency::init_branching;

    #[test]
    fn init_eta_is_nonnegative() {
        let eta = init_eta(4, 2);
        assert!(eta.iter().all(|&x| x >= 0.0));
    }

    #[test]
    fn grad_llh_eta_has_correct_shape() {
        let adj = init_branching(3);
        let phi = Array2::<f64>::from_elem((3, 1), 0.5);
        let v = Array2::<u32>::from_elem((2, 1), 5);
        let n = Array2::<u32>::from_elem((2, 1), 10);
        let omega = Array2::<f64>::from_elem((2, 1), 1.0);
        let grad = grad_llh_eta(&adj, &phi, &v, &n, &omega);
        assert_eq!(grad.shape(), &[3, 1]);
    }
}
