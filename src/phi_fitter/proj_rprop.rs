//! Rprop's adaptive per-parameter step size, combined with `projection`'s
//! nonnegativity clamp on `eta`. The default solver (spec §4.2 Open
//! Question): fastest convergence of the four with the sum condition held
//! exactly throughout, not just at the end.

use ndarray::Array2;

use super::{finish, grad_llh_eta, init_eta, PhiFitter};
use crate::model::phi::Phi;

const STEP_GROW: f64 = 1.2;
const STEP_SHRINK: f64 = 0.5;
const STEP_MIN: f64 = 1e-8;
const STEP_MAX: f64 = 10.0;

pub struct ProjRprop {
    pub max_iters: usize,
    pub initial_step: f64,
}

impl ProjRprop {
    pub fn new(max_iters: usize, initial_step: f64) -> Self {
        ProjRprop { max_iters, initial_step }
    }
}

impl PhiFitter for ProjRprop {
    fn fit(&self, adj: &Array2<u8>, v: &Array2<u32>, n: &Array2<u32>, omega: &Array2<f64>) -> (Phi, Array2<f64>) {
        let k = adj.nrows();
        let s = v.ncols();
        let mut eta = init_eta(k, s);
        let mut step = Array2::<f64>::from_elem((k, s), self.initial_step);
        let mut prev_grad = Array2::<f64>::zeros((k, s));

        for _ in 0..self.max_iters {
            let phi = crate::model::phi::eta_to_phi(adj, &eta).0;
            let grad = grad_llh_eta(adj, &phi, v, n, omega);

            for row in 0..k {
                for col in 0..s {
                    let sign_product = prev_grad[[row, col]] * grad[[row, col]];
                    if sign_product > 0.0 {
                        step[[row, col]] = (step[[row, col]] * STEP_GROW).min(STEP_MAX);
                    } else if sign_product < 0.0 {
                        step[[row, col]] = (step[[row, col]] * STEP_SHRINK).max(STEP_MIN);
                    }
                    let direction = grad[[row, col]].signum();
                    eta[[row, col]] += direction * step[[row, col]];
                }
            }
            eta.mapv_inplace(|x| x.max(0.0));
            prev_grad = grad;
        }

        finish(adj, &eta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::adjacency::init_branching;

    #[test]
    fn sum_condition_holds_and_converges() {
        let adj = init_branching(2);
        let v = Array2::<u32>::from_elem((1, 1), 55);
        let n = Array2::<u32>::from_elem((1, 1), 100);
        let omega = Array2::<f64>::from_elem((1, 1), 1.0);

        let solver = ProjRprop::new(300, 0.01);
        let (phi, _slack) = solver.fit(&adj, &v, &n, &omega);
        phi.assert_invariants(&adj);
        assert!((phi.0[[1, 0]] - 0.55).abs() < 0.05, "got phi={}", phi.0[[1, 0]]);
    }
}
