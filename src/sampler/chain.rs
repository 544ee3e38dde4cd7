//! The Metropolis-Hastings tree sampler core: one chain's worth of
//! proposal/accept iterations (spec §4.3, §5).
//!
//! Each iteration proposes moving a node (chosen by `sampler::weights::
//! w_subtree`) under a candidate parent (chosen by `w_parents`), refits
//! `phi` under the proposed structure, and accepts or rejects via the
//! standard MH ratio, corrected for the proposal's asymmetry. The
//! acceptance target is the phi log-likelihood alone (spec §4.3: `log α =
//! (llh_phi' − llh_phi) + (log q(T|T') − log q(T'|T))`); the mutrel tensor
//! only ever informs the proposal weights (`sampler::weights`), never the
//! target distribution itself. Because both weight distributions depend on
//! the current tree, the reverse proposal's probability must be evaluated
//! against the *proposed* tree, and `modify_tree`'s swap-vs-reattach choice
//! determines which node the reverse move treats as the subtree.

use ndarray::Array2;
use rand::Rng;

use crate::hyperparams::Hyperparams;
use crate::model::adjacency::{self, modify_tree};
use crate::model::mutrel::MutRel;
use crate::model::phi::{self, Phi};
use crate::phi_fitter::PhiMethod;
use crate::result::TreeSample;
use crate::sampler::weights::{sample_categorical, w_parents, w_subtree};

/// Fits `phi` against `adj` and discards the sum-condition slack diagnostic;
/// every call site here only needs the fitted frequencies themselves.
fn fit_phi(adj: &Array2<u8>, v: &Array2<u32>, n: &Array2<u32>, omega: &Array2<f64>, method: PhiMethod, phi_iters: usize, step_size: f64) -> Phi {
    let fitter = method.build(phi_iters, step_size);
    let (phi, _slack) = fitter.fit(adj, v, n, omega);
    phi
}

/// One MH proposal/accept step. Returns the tree (unchanged if rejected),
/// its phi matrix and score, and whether the proposal was accepted.
/// `progress` is the chain's fraction through its total iteration budget
/// (0 at the first iteration, 1 at the last), fed to `w_subtree`'s
/// progress-dependent depth term.
#[allow(clippy::too_many_arguments)]
fn propose_and_accept<R: Rng + ?Sized>(
    adj: Array2<u8>,
    phi_cur: Phi,
    score_cur: f64,
    v: &Array2<u32>,
    n: &Array2<u32>,
    omega: &Array2<f64>,
    data_mutrel: &MutRel,
    supercluster_vids: &[String],
    hp: &Hyperparams,
    phi_method: PhiMethod,
    phi_iters: usize,
    progress: f64,
    rng: &mut R,
) -> (Array2<u8>, Phi, f64, bool) {
    let anc = adjacency::make_ancestral_from_adj(&adj);

    let w_subtree_old = w_subtree(&adj, data_mutrel, supercluster_vids, hp.tau, hp.rho, hp.psi, progress);
    let subtree = sample_categorical(&w_subtree_old, rng);
    let old_parent = adjacency::find_parent(&adj, subtree);
    let w_parents_old = w_parents(subtree, &adj, data_mutrel, hp.theta, hp.kappa, hp.psi);
    let new_parent = sample_categorical(&w_parents_old, rng);

    if new_parent == old_parent {
        return (adj, phi_cur, score_cur, false);
    }

    // `modify_tree` swaps `subtree` and `new_parent`'s positions instead of
    // a plain reattach when `new_parent` is currently a descendant of
    // `subtree`: figure out which node the reverse proposal must treat as
    // "the subtree" before building the reverse weight vectors.
    let swapped = anc[[subtree, new_parent]] == 1;
    let proposed = modify_tree(&adj, &anc, subtree, new_parent);
    let proposed_phi = fit_phi(&proposed, v, n, omega, phi_method, phi_iters, 0.01);
    let score_new = phi::calc_llh_phi(&proposed_phi, v, n, omega);

    let (reverse_subtree, reverse_new_parent) = if swapped { (new_parent, subtree) } else { (subtree, old_parent) };
    let w_subtree_new = w_subtree(&proposed, data_mutrel, supercluster_vids, hp.tau, hp.rho, hp.psi, progress);
    let w_parents_new = w_parents(reverse_subtree, &proposed, data_mutrel, hp.theta, hp.kappa, hp.psi);

    let q_forward = w_subtree_old[subtree] * w_parents_old[new_parent];
    let q_reverse = w_subtree_new[reverse_subtree] * w_parents_new[reverse_new_parent];
    let log_proposal_ratio = q_reverse.ln() - q_forward.ln();

    // spec §4.3: target is exp(llh_phi) alone; the mutrel tensor informs
    // only the proposal weights above, never this acceptance ratio.
    let log_alpha = (score_new - score_cur) + log_proposal_ratio;
    let accept = log_alpha >= 0.0 || rng.gen::<f64>().ln() < log_alpha;

    if accept {
        (proposed, proposed_phi, score_new, true)
    } else {
        (adj, phi_cur, score_cur, false)
    }
}

/// Initialize a chain: star topology, phi fit once against it.
pub fn init_chain(
    k: usize,
    v: &Array2<u32>,
    n: &Array2<u32>,
    omega: &Array2<f64>,
    phi_method: PhiMethod,
    phi_iters: usize,
) -> (Array2<u8>, Phi) {
    let adj = adjacency::init_branching(k);
    let phi = fit_phi(&adj, v, n, omega, phi_method, phi_iters, 0.01);
    (adj, phi)
}

/// Run one chain to completion: `burn_in` proposal steps discarded, then one
/// sample retained every `thin` steps until `nsamples` have been collected.
/// `progress` (if given) receives one unit token per completed iteration,
/// matching the teacher's progress-reporting idiom.
#[allow(clippy::too_many_arguments)]
pub fn run_chain<R: Rng + ?Sized>(
    v: &Array2<u32>,
    n: &Array2<u32>,
    omega: &Array2<f64>,
    data_mutrel: &MutRel,
    supercluster_vids: &[String],
    hp: &Hyperparams,
    phi_method: PhiMethod,
    phi_iters: usize,
    burn_in: usize,
    nsamples: usize,
    thin: usize,
    rng: &mut R,
    progress: Option<&crossbeam_channel::Sender<()>>,
) -> Vec<TreeSample> {
    let k = v.nrows() + 1;
    let (mut adj, mut phi) = init_chain(k, v, n, omega, phi_method, phi_iters);
    let mut score = phi::calc_llh_phi(&phi, v, n, omega);

    let total_post_burnin = nsamples * thin.max(1);
    let total_iters = burn_in + total_post_burnin;
    let mut iter = 0usize;
    let mut next_progress = || {
        let p = if total_iters <= 1 { 0.0 } else { iter as f64 / (total_iters - 1) as f64 };
        iter += 1;
        p
    };

    for _ in 0..burn_in {
        let (next_adj, next_phi, next_score, _) = propose_and_accept(
            adj,
            phi,
            score,
            v,
            n,
            omega,
            data_mutrel,
            supercluster_vids,
            hp,
            phi_method,
            phi_iters,
            next_progress(),
            rng,
        );
        adj = next_adj;
        phi = next_phi;
        score = next_score;
        if let Some(tx) = progress {
            let _ = tx.send(());
        }
    }

    let mut samples = Vec::with_capacity(nsamples);
    for i in 0..total_post_burnin {
        let (next_adj, next_phi, next_score, _) = propose_and_accept(
            adj,
            phi,
            score,
            v,
            n,
            omega,
            data_mutrel,
            supercluster_vids,
            hp,
            phi_method,
            phi_iters,
            next_progress(),
            rng,
        );
        adj = next_adj;
        phi = next_phi;
        score = next_score;
        if let Some(tx) = progress {
            let _ = tx.send(());
        }
        if (i + 1) % thin.max(1) == 0 {
            let llh = phi::calc_llh_phi(&phi, v, n, omega);
            samples.push(TreeSample::new(adj.clone(), phi.clone(), llh));
        }
    }

    samples
}

/// Fixed-structure bypass mode (spec §4.3 Open Question, §6): skip the
/// topology search entirely and just fit phi against each caller-supplied
/// structure. Used when the caller already trusts a set of tree structures
/// (e.g. from a prior run or an external tool) and only wants frequencies.
pub fn use_existing_structures(
    structures: &[Array2<u8>],
    v: &Array2<u32>,
    n: &Array2<u32>,
    omega: &Array2<f64>,
    phi_method: PhiMethod,
    phi_iters: usize,
) -> Vec<TreeSample> {
    structures
        .iter()
        .map(|adj| {
            adjacency::assert_invariants(adj);
            let phi = fit_phi(adj, v, n, omega, phi_method, phi_iters, 0.01);
            let llh = crate::model::phi::calc_llh_phi(&phi, v, n, omega);
            TreeSample::new(adj.clone(), phi, llh)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::variant::Variant;
    use crate::pairwise::{calc_posterior, LogPrior};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn two_supervariant_run() -> (Array2<u32>, Array2<u32>, Array2<f64>, MutRel, Vec<String>) {
        let items = vec![
            Variant { id: "S0".into(), var_reads: vec![70], ref_reads: vec![30], omega_v: vec![0.5] },
            Variant { id: "S1".into(), var_reads: vec![20], ref_reads: vec![80], omega_v: vec![0.5] },
        ];
        let (data_mutrel, _) = calc_posterior(&items, &LogPrior::clustered(), 0).unwrap();
        let v = Array2::<u32>::from_shape_vec((2, 1), vec![70, 20]).unwrap();
        let n = Array2::<u32>::from_shape_vec((2, 1), vec![100, 100]).unwrap();
        let omega = Array2::<f64>::from_elem((2, 1), 0.5);
        (v, n, omega, data_mutrel, vec!["root".into(), "S0".into(), "S1".into()])
    }

    #[test]
    fn run_chain_produces_the_requested_sample_count() {
        let (v, n, omega, data_mutrel, vids) = two_supervariant_run();
        let hp = Hyperparams::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let samples = run_chain(&v, &n, &omega, &data_mutrel, &vids, &hp, PhiMethod::ProjRprop, 50, 10, 5, 2, &mut rng, None);
        assert_eq!(samples.len(), 5);
        for s in &samples {
            adjacency::assert_invariants(&s.adj);
        }
    }

    #[test]
    fn same_seed_reproduces_identical_samples() {
        let (v, n, omega, data_mutrel, vids) = two_supervariant_run();
        let hp = Hyperparams::default();

        let mut rng_a = ChaCha8Rng::seed_from_u64(99);
        let samples_a = run_chain(&v, &n, &omega, &data_mutrel, &vids, &hp, PhiMethod::ProjRprop, 50, 5, 3, 2, &mut rng_a, None);

        let mut rng_b = ChaCha8Rng::seed_from_u64(99);
        let samples_b = run_chain(&v, &n, &omega, &data_mutrel, &vids, &hp, PhiMethod::ProjRprop, 50, 5, 3, 2, &mut rng_b, None);

        assert_eq!(samples_a.len(), samples_b.len());
        for (a, b) in samples_a.iter().zip(samples_b.iter()) {
            assert_eq!(a.adj, b.adj);
            assert!((a.llh - b.llh).abs() < 1e-12);
        }
    }

    #[test]
    fn use_existing_structures_skips_the_topology_search() {
        let (v, n, omega, _data_mutrel, _vids) = two_supervariant_run();
        let structures = vec![adjacency::init_branching(3), adjacency::init_linear(3)];
        let samples = use_existing_structures(&structures, &v, &n, &omega, PhiMethod::ProjRprop, 50);
        assert_eq!(samples.len(), 2);
    }

    /// Statistical spot check on the chain's stationary distribution: with
    /// two superclusters carrying identical read counts, "S0 ancestral to
    /// S1" and "S1 ancestral to S0" are equally likely under the posterior
    /// by symmetry, so a long-enough run should visit both close to equally
    /// often. A smaller-scale stand-in for a full 1e5-step detailed-balance
    /// check — the property under test is the stationary distribution's
    /// shape, not a specific step count.
    #[test]
    fn symmetric_data_visits_both_topologies_about_equally_often() {
        let items = vec![
            Variant { id: "S0".into(), var_reads: vec![50], ref_reads: vec![50], omega_v: vec![0.5] },
            Variant { id: "S1".into(), var_reads: vec![50], ref_reads: vec![50], omega_v: vec![0.5] },
        ];
        let (data_mutrel, _) = calc_posterior(&items, &LogPrior::clustered(), 0).unwrap();
        let v = Array2::<u32>::from_shape_vec((2, 1), vec![50, 50]).unwrap();
        let n = Array2::<u32>::from_shape_vec((2, 1), vec![100, 100]).unwrap();
        let omega = Array2::<f64>::from_elem((2, 1), 0.5);
        let vids = vec!["root".into(), "S0".into(), "S1".into()];
        let hp = Hyperparams::default();

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let samples = run_chain(&v, &n, &omega, &data_mutrel, &vids, &hp, PhiMethod::ProjRprop, 30, 2000, 1, 1, &mut rng, None);

        let s0_before_s1 = samples.iter().filter(|s| adjacency::find_parent(&s.adj, 2) == 1).count();
        let s1_before_s0 = samples.iter().filter(|s| adjacency::find_parent(&s.adj, 1) == 2).count();
        let star = samples.len() - s0_before_s1 - s1_before_s0;
        assert_eq!(s0_before_s1 + s1_before_s0 + star, samples.len());

        let ancestral_total = s0_before_s1 + s1_before_s0;
        assert!(ancestral_total > 0, "expected at least some ancestral-topology visits in 2000 samples");
        let frac = s0_before_s1 as f64 / ancestral_total as f64;
        assert!((frac - 0.5).abs() < 0.2, "expected the two ancestral directions to be visited about equally often, got S0-before-S1 fraction {} ({} of {})", frac, s0_before_s1, ancestral_total);
    }
}
