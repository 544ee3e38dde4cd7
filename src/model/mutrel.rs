//! The pairwise relation tensor (`MutRel`) and the relation-type index it is
//! keyed on.

use ndarray::{Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

use crate::model::adjacency;

/// The five pairwise relation outcomes (spec §3 GLOSSARY). Discriminants
/// double as the tensor's last-axis index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
pub enum RelType {
    /// A is ancestral to B.
    ABeforeB = 0,
    /// B is ancestral to A.
    BBeforeA = 1,
    /// A and B are in the same cluster.
    Cocluster = 2,
    /// A and B are on different branches.
    DiffBranch = 3,
    /// At least one of A, B is garbage.
    Garbage = 4,
}

pub const NUM_REL_TYPES: usize = 5;

impl RelType {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// `rels: K x K x 5`, `vids`: the ordered id list aligned to the first two
/// axes. Invariants (spec §3): diagonal is pure cocluster; off-diagonal
/// rows normalize to 1; `rels[i,j,A_B] == rels[j,i,B_A]`, and the
/// `Cocluster`/`DiffBranch` slots are symmetric outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutRel {
    pub rels: Array3<f64>,
    pub vids: Vec<String>,
}

impl MutRel {
    pub fn k(&self) -> usize {
        self.vids.len()
    }

    /// Allocate a `K x K x 5` tensor with the diagonal set to pure
    /// cocluster and everything else zeroed, ready for a caller to fill in
    /// off-diagonal entries.
    pub fn zeroed(vids: Vec<String>) -> Self {
        let k = vids.len();
        let mut rels = Array3::<f64>::zeros((k, k, NUM_REL_TYPES));
        for i in 0..k {
            rels[[i, i, RelType::Cocluster.index()]] = 1.0;
        }
        MutRel { rels, vids }
    }

    pub fn assert_invariants(&self) {
        let k = self.k();
        assert_eq!(self.rels.shape(), &[k, k, NUM_REL_TYPES]);
        for i in 0..k {
            for r in 0..NUM_REL_TYPES {
                let expected = if r == RelType::Cocluster.index() { 1.0 } else { 0.0 };
                assert!(
                    (self.rels[[i, i, r]] - expected).abs() < 1e-9,
                    "diagonal of mutrel tensor must be pure cocluster"
                );
            }
        }
        for i in 0..k {
            for j in 0..k {
                let sum: f64 = (0..NUM_REL_TYPES).map(|r| self.rels[[i, j, r]]).sum();
                assert!((sum - 1.0).abs() < 1e-9, "rels[{},{},:] must sum to 1, got {}", i, j, sum);
            }
        }
        for i in 0..k {
            for j in 0..k {
                assert!(
                    (self.rels[[i, j, RelType::ABeforeB.index()]]
                        - self.rels[[j, i, RelType::BBeforeA.index()]])
                        .abs()
                        < 1e-9
                );
                assert!(
                    (self.rels[[i, j, RelType::Cocluster.index()]]
                        - self.rels[[j, i, RelType::Cocluster.index()]])
                        .abs()
                        < 1e-9
                );
                assert!(
                    (self.rels[[i, j, RelType::DiffBranch.index()]]
                        - self.rels[[j, i, RelType::DiffBranch.index()]])
                        .abs()
                        < 1e-9
                );
            }
        }
    }

    /// Per-node mutrel fit of this tensor (treated as the data/target)
    /// against `tree_mutrel` (the tree-implied tensor): for node `i`,
    /// `sum_{j,r} log(max(eps, 1 - |data[i,j,r] - tree[i,j,r]|))`. Returns
    /// the per-node vector and its scalar sum (the log-likelihood `tree`
    /// gets credit for under the mutrel-fit proposal bias). Mirrors
    /// `_calc_llh_mutrel` in the reference implementation.
    pub fn fit_against(&self, tree_mutrel: &MutRel) -> (f64, Array1<f64>) {
        let k = self.k();
        assert_eq!(tree_mutrel.k(), k, "data and tree mutrel tensors must have matching K");
        const EPSILON: f64 = 1e-10;

        let mut error = self.rels.clone();
        error -= &tree_mutrel.rels;
        error.mapv_inplace(f64::abs);
        assert!(error.iter().all(|&e| e <= 1.0 + 1e-9));

        let fit = error.mapv(|e| (1.0 - e).max(EPSILON).ln());
        // Sum over the relation-type axis, then over `j`: `fit_mutrel[i]`
        // is the total fit score for every pair involving node `i`.
        let per_node = fit.sum_axis(Axis(2)).sum_axis(Axis(1));
        let llh = per_node.sum();
        (llh, per_node)
    }
}

/// Build the tree-implied mutrel tensor over the *non-root* superclusters.
///
/// `adj` is the full `K x K` adjacency (root included at index 0);
/// `supercluster_vids` is the matching full-length id list. The returned
/// tensor is `(K-1) x (K-1) x 5`, covering only adjacency nodes `1..K`,
/// because the root is a synthetic empty cluster that never has pairwise
/// posterior data to compare against (the data-side `MutRel` the sampler
/// consumes is likewise `(K-1) x (K-1)`). This is
/// `make_mutrel_tensor_from_cluster_adj` in the reference implementation.
pub fn make_mutrel_tensor_from_cluster_adj(adj: &Array2<u8>, supercluster_vids: &[String]) -> MutRel {
    let k = adj.nrows();
    assert_eq!(supercluster_vids.len(), k);
    let anc = adjacency::make_ancestral_from_adj(adj);
    let m = k - 1;
    let mut rels = Array3::<f64>::zeros((m, m, NUM_REL_TYPES));

    for a in 0..m {
        for b in 0..m {
            let (i, j) = (a + 1, b + 1);
            let r = if i == j {
                RelType::Cocluster
            } else if anc[[i, j]] == 1 {
                RelType::ABeforeB
            } else if anc[[j, i]] == 1 {
                RelType::BBeforeA
            } else {
                RelType::DiffBranch
            };
            rels[[a, b, r.index()]] = 1.0;
        }
    }

    MutRel {
        rels,
        vids: supercluster_vids[1..].to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::adjacency::init_branching;

    #[test]
    fn zeroed_tensor_satisfies_invariants() {
        let mr = MutRel::zeroed(vec!["A".into(), "B".into(), "C".into()]);
        mr.assert_invariants();
    }

    #[test]
    fn tree_tensor_satisfies_invariants_and_symmetry() {
        // Star: root(0) -> {1,2,3}. Non-root tensor is 3x3 over "S0","S1","S2".
        let adj = init_branching(4);
        let vids = vec!["root".into(), "S0".into(), "S1".into(), "S2".into()];
        let mr = make_mutrel_tensor_from_cluster_adj(&adj, &vids);
        assert_eq!(mr.k(), 3);
        mr.assert_invariants();
        assert_eq!(mr.vids, vec!["S0", "S1", "S2"]);
        // every pair of siblings is DIFF_BRANCH under the star topology
        assert_eq!(mr.rels[[0, 1, RelType::DiffBranch.index()]], 1.0);
    }

    #[test]
    fn fit_against_self_is_maximal() {
        let adj = init_branching(4);
        let vids = vec!["root".into(), "S0".into(), "S1".into(), "S2".into()];
        let mr = make_mutrel_tensor_from_cluster_adj(&adj, &vids);
        let (llh, per_node) = mr.fit_against(&mr);
        assert!(llh.abs() < 1e-6, "fitting a tensor against itself should have ~zero error");
        assert_eq!(per_node.len(), 3);
    }
}
