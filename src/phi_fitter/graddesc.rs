//! Plain gradient ascent on `eta`, no projection. Fastest and simplest of
//! the four solvers. `eta >= 0` is enforced by a softplus reparameterization
//! (spec §4.2) rather than a per-step clamp: the ascent runs on an
//! unconstrained `eta_raw` with `eta = softplus(eta_raw)`, so every iterate
//! already satisfies the sum condition instead of relying on it holding
//! approximately from the starting point alone.

use ndarray::Array2;

use super::{finish, grad_llh_eta, init_eta, sigmoid, softplus, softplus_inv, PhiFitter};
use crate::model::phi::Phi;

pub struct GradDesc {
    pub max_iters: usize,
    pub step_size: f64,
}

impl PhiFitter for GradDesc {
    fn fit(&self, adj: &Array2<u8>, v: &Array2<u32>, n: &Array2<u32>, omega: &Array2<f64>) -> (Phi, Array2<f64>) {
        let k = adj.nrows();
        let s = v.ncols();
        let mut eta_raw = init_eta(k, s).mapv(softplus_inv);

        for _ in 0..self.max_iters {
            let eta = eta_raw.mapv(softplus);
            let phi = crate::model::phi::eta_to_phi(adj, &eta).0;
            let grad_eta = grad_llh_eta(adj, &phi, v, n, omega);
            let grad_raw = &grad_eta * &eta_raw.mapv(sigmoid);
            eta_raw = &eta_raw + &(grad_raw * self.step_size);
        }

        finish(adj, &eta_raw.mapv(softplus))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::adjacency::init_branching;

    #[test]
    fn converges_towards_observed_frequency_on_a_star() {
        let adj = init_branching(2);
        let v = Array2::<u32>::from_elem((1, 1), 70);
        let n = Array2::<u32>::from_elem((1, 1), 100);
        let omega = Array2::<f64>::from_elem((1, 1), 1.0);

        let solver = GradDesc { max_iters: 500, step_size: 0.01 };
        let (phi, _slack) = solver.fit(&adj, &v, &n, &omega);
        assert!((phi.0[[1, 0]] - 0.7).abs() < 0.05, "got phi={}", phi.0[[1, 0]]);
    }
}
