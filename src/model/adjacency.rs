//! Rooted-tree adjacency matrices: invariants, ancestor closure, depth,
//! initial topologies and the swap/reattach move operator.
//!
//! Convention (spec §3): `adj` is `K x K` of `{0,1}`; the diagonal is all 1
//! (self-loops by convention); every non-root column has exactly one
//! off-diagonal 1 (its parent edge); column 0 (the root) has none. Node 0 is
//! always root.

use ndarray::{Array1, Array2};

/// Assert the structural invariants spec §3/§8 place on an adjacency
/// matrix: unit diagonal, total sum `K + (K-1)`, column-sum multiset
/// `[1] + [2]*(K-1)` (root column sums to 1, all others to 2).
pub fn assert_invariants(adj: &Array2<u8>) {
    let k = adj.nrows();
    assert_eq!(adj.ncols(), k, "adjacency matrix must be square");
    for i in 0..k {
        assert_eq!(adj[[i, i]], 1, "diagonal entry {} must be 1", i);
    }
    let total: u32 = adj.iter().map(|&x| x as u32).sum();
    assert_eq!(total as usize, k + (k - 1), "adjacency entries must sum to K + (K-1)");

    let mut col_sums: Vec<u32> = (0..k)
        .map(|j| (0..k).map(|i| adj[[i, j]] as u32).sum())
        .collect();
    col_sums.sort_unstable();
    let mut expected = vec![2u32; k];
    expected[0] = 1;
    assert_eq!(col_sums, expected, "column-sum pattern must be [1] + [2]*(K-1)");
    assert_eq!(
        (0..k).map(|i| adj[[i, 0]] as u32).sum::<u32>(),
        1,
        "root column (0) must have no off-diagonal entries"
    );
}

/// Star/branching initial topology: every non-root node is a direct child
/// of node 0. The default initializer (spec §4.3): unbiased w.r.t. depth,
/// requires no later moves to "undo" a baked-in parent choice.
pub fn init_branching(k: usize) -> Array2<u8> {
    let mut adj = Array2::<u8>::eye(k);
    for j in 0..k {
        adj[[0, j]] = 1;
    }
    adj
}

/// Linear-chain initial topology: node `i` is the parent of node `i+1`.
/// Not the default, but retained as an alternative initializer (spec §4.3).
pub fn init_linear(k: usize) -> Array2<u8> {
    let mut adj = Array2::<u8>::eye(k);
    for i in 1..k {
        adj[[i - 1, i]] = 1;
    }
    adj
}

/// Random DAG restricted to `parent(i) < i`, preventing cycles. Not the
/// default; retained as an alternative initializer (spec §4.3).
pub fn init_random<R: rand::Rng + ?Sized>(k: usize, rng: &mut R) -> Array2<u8> {
    let mut adj = Array2::<u8>::eye(k);
    for i in 1..k {
        let parent = rng.gen_range(0..i);
        adj[[parent, i]] = 1;
    }
    adj
}

/// Build a `K x K` adjacency matrix from a parent list (`parents[i]` is the
/// parent of node `i`, for `i >= 1`; `parents[0]` is ignored). This is the
/// host-facing conversion used when the caller supplies structures directly
/// (spec §4.3 fixed-structure mode, §6 `structures` input).
pub fn from_parent_list(parents: &[usize]) -> Array2<u8> {
    let k = parents.len();
    let mut adj = Array2::<u8>::eye(k);
    for (node, &parent) in parents.iter().enumerate().skip(1) {
        adj[[parent, node]] = 1;
    }
    adj
}

/// `anc[i,j] = 1` iff `i` is a strict ancestor of `j`. Computed by walking
/// each non-root node's parent chain to the root.
pub fn make_ancestral_from_adj(adj: &Array2<u8>) -> Array2<u8> {
    let k = adj.nrows();
    let mut anc = Array2::<u8>::zeros((k, k));
    let parents = all_parents(adj);
    for node in 1..k {
        let mut p = parents[node];
        loop {
            anc[[p, node]] = 1;
            if p == 0 {
                break;
            }
            p = parents[p];
        }
    }
    anc
}

/// Parent of every node, `parents[0]` is a meaningless `0` sentinel (the
/// root has no parent).
fn all_parents(adj: &Array2<u8>) -> Vec<usize> {
    let k = adj.nrows();
    let mut parents = vec![0usize; k];
    for node in 1..k {
        parents[node] = find_parent(adj, node);
    }
    parents
}

/// Parent of `node` under `adj`. Panics if `node` does not have exactly one
/// off-diagonal predecessor, which would mean `adj` violates its invariants.
pub fn find_parent(adj: &Array2<u8>, node: usize) -> usize {
    let k = adj.nrows();
    let mut found = None;
    for i in 0..k {
        if i != node && adj[[i, node]] == 1 {
            assert!(found.is_none(), "node {} has more than one parent", node);
            found = Some(i);
        }
    }
    found.unwrap_or_else(|| panic!("node {} has no parent", node))
}

/// Depth (in edges from the root) of every node, normalized by the maximum
/// depth so values lie in `[0,1]`. `depth_frac[0] == 0`.
pub fn calc_depth_frac(adj: &Array2<u8>) -> Array1<f64> {
    let k = adj.nrows();
    let mut depth = Array1::<f64>::zeros(k);
    let mut stack = vec![0usize];
    while let Some(p) = stack.pop() {
        for c in 0..k {
            if c != p && adj[[p, c]] == 1 {
                depth[c] = depth[p] + 1.0;
                stack.push(c);
            }
        }
    }
    let max_depth = depth.iter().cloned().fold(0.0_f64, f64::max);
    assert!(max_depth > 0.0, "tree with a single node has no depth to normalize");
    depth.mapv(|d| d / max_depth)
}

/// Apply the proposal's move operator: reattach `subtree` under
/// `new_parent`, or swap their positions if `subtree` is currently an
/// ancestor of `new_parent` (reattaching directly would orphan the tree).
/// Mirrors `_modify_tree` in the reference implementation; `subtree` can
/// never be the root.
pub fn modify_tree(adj: &Array2<u8>, anc: &Array2<u8>, subtree: usize, new_parent: usize) -> Array2<u8> {
    let k = adj.nrows();
    assert!(new_parent < k);
    assert!(subtree > 0 && subtree < k, "the root is never the moved subtree");

    if subtree == new_parent {
        return adj.clone();
    }

    assert_invariants(adj);

    let mut adj = adj.clone();
    let mut anc = anc.clone();
    for i in 0..k {
        adj[[i, i]] = 0;
        anc[[i, i]] = 0;
    }

    if anc[[subtree, new_parent]] == 1 {
        // `new_parent` is a descendant of `subtree`: reattaching directly
        // would disconnect `new_parent`'s own ancestor chain. Swap the two
        // nodes' positions in the tree instead.
        let had_direct_edge = adj[[subtree, new_parent]] == 1;
        assert_eq!(anc[[new_parent, subtree]], 0);
        assert_eq!(adj[[new_parent, subtree]], 0);
        if had_direct_edge {
            adj[[subtree, new_parent]] = 0;
        }

        let col_np = adj.column(new_parent).to_owned();
        let col_st = adj.column(subtree).to_owned();
        let row_np = adj.row(new_parent).to_owned();
        let row_st = adj.row(subtree).to_owned();
        adj.row_mut(new_parent).assign(&row_st);
        adj.row_mut(subtree).assign(&row_np);
        adj.column_mut(new_parent).assign(&col_st);
        adj.column_mut(subtree).assign(&col_np);

        if had_direct_edge {
            adj[[new_parent, subtree]] = 1;
        }
    } else {
        for i in 0..k {
            adj[[i, subtree]] = 0;
        }
        adj[[new_parent, subtree]] = 1;
    }

    for i in 0..k {
        adj[[i, i]] = 1;
    }
    adj
}
