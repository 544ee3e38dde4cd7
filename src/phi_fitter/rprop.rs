//! Resilient backpropagation (Rprop): per-parameter adaptive step sizes
//! driven only by the sign of the gradient, not its magnitude. Converges
//! faster than plain gradient ascent on the flat plateaus the binomial
//! log-likelihood surface tends to have near its optimum.
//!
//! Like `graddesc`, `eta >= 0` is enforced by a softplus reparameterization
//! (spec §4.2): the adaptive step sizes live in the unconstrained `eta_raw`
//! space. Since `softplus` is strictly increasing, its derivative (the
//! sigmoid chain-rule factor) is always positive, so the sign of the
//! `eta_raw`-space gradient always matches the sign of the `eta`-space
//! gradient and the sign-agreement logic below is unaffected by the change
//! of variables.

use ndarray::Array2;

use super::{finish, grad_llh_eta, init_eta, sigmoid, softplus, softplus_inv, PhiFitter};
use crate::model::phi::Phi;

const STEP_GROW: f64 = 1.2;
const STEP_SHRINK: f64 = 0.5;
const STEP_MIN: f64 = 1e-8;
const STEP_MAX: f64 = 10.0;

pub struct Rprop {
    pub max_iters: usize,
    pub initial_step: f64,
}

impl Rprop {
    pub fn new(max_iters: usize, initial_step: f64) -> Self {
        Rprop { max_iters, initial_step }
    }
}

impl PhiFitter for Rprop {
    fn fit(&self, adj: &Array2<u8>, v: &Array2<u32>, n: &Array2<u32>, omega: &Array2<f64>) -> (Phi, Array2<f64>) {
        let k = adj.nrows();
        let s = v.ncols();
        let mut eta_raw = init_eta(k, s).mapv(softplus_inv);
        let mut step = Array2::<f64>::from_elem((k, s), self.initial_step);
        let mut prev_grad = Array2::<f64>::zeros((k, s));

        for _ in 0..self.max_iters {
            let eta = eta_raw.mapv(softplus);
            let phi = crate::model::phi::eta_to_phi(adj, &eta).0;
            let grad_eta = grad_llh_eta(adj, &phi, v, n, omega);
            let grad = &grad_eta * &eta_raw.mapv(sigmoid);

            for row in 0..k {
                for col in 0..s {
                    let sign_product = prev_grad[[row, col]] * grad[[row, col]];
                    if sign_product > 0.0 {
                        step[[row, col]] = (step[[row, col]] * STEP_GROW).min(STEP_MAX);
                    } else if sign_product < 0.0 {
                        step[[row, col]] = (step[[row, col]] * STEP_SHRINK).max(STEP_MIN);
                    }
                    let direction = grad[[row, col]].signum();
                    eta_raw[[row, col]] += direction * step[[row, col]];
                }
            }
            prev_grad = grad;
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
        let v = Array2::<u32>::from_elem((1, 1), 30);
        let n = Array2::<u32>::from_elem((1, 1), 100);
        let omega = Array2::<f64>::from_elem((1, 1), 1.0);

        let solver = Rprop::new(200, 0.01);
        let (phi, _slack) = solver.fit(&adj, &v, &n, &omega);
        assert!((phi.0[[1, 0]] - 0.3).abs() < 0.05, "got phi={}", phi.0[[1, 0]]);
    }
}
