//! Projected gradient ascent: identical update rule to `graddesc`, but
//! clamps `eta` to be nonnegative after every step. Since `phi = E . eta`
//! with `E` a 0/1 ancestor-sum matrix, `eta >= 0` is sufficient for the sum
//! condition to hold exactly at every iteration, not just at convergence.

use ndarray::Array2;

use super::{finish, grad_llh_eta, init_eta, PhiFitter};
use crate::model::phi::Phi;

pub struct Projection {
    pub max_iters: usize,
    pub step_size: f64,
}

impl PhiFitter for Projection {
    fn fit(&self, adj: &Array2<u8>, v: &Array2<u32>, n: &Array2<u32>, omega: &Array2<f64>) -> (Phi, Array2<f64>) {
        let k = adj.nrows();
        let s = v.ncols();
        let mut eta = init_eta(k, s);

        for _ in 0..self.max_iters {
            let phi = crate::model::phi::eta_to_phi(adj, &eta).0;
            let grad = grad_llh_eta(adj, &phi, v, n, omega);
            eta = &eta + &(grad * self.step_size);
            eta.mapv_inplace(|x| x.max(0.0));
        }

        finish(adj, &eta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::adjacency::init_branching;

    #[test]
    fn sum_condition_holds_exactly_at_every_iteration_budget() {
        let adj = init_branching(3);
        let v = Array2::<u32>::from_shape_vec((2, 1), vec![60, 20]).unwrap();
        let n = Array2::<u32>::from_elem((2, 1), 100);
        let omega = Array2::<f64>::from_elem((2, 1), 1.0);

        for iters in [1usize, 10, 100] {
            let solver = Projection { max_iters: iters, step_size: 0.01 };
            let (phi, _slack) = solver.fit(&adj, &v, &n, &omega);
            phi.assert_invariants(&adj);
        }
    }
}
