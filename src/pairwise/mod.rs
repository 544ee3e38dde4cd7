//! The pairwise posterior engine (spec §4.1): for every ordered pair of
//! variants, integrate the binomial read-count likelihood over the feasible
//! `(phi_i, phi_j)` region implied by each of the five relation hypotheses,
//! combine with a log-domain prior, and normalize into a `MutRel`.

pub mod quadrature;

use ndarray::Array2;
use rayon::prelude::*;

use crate::errors::Error;
use crate::model::mutrel::{MutRel, RelType, NUM_REL_TYPES};
use crate::model::phi::{clip, log_binomial_pmf};
use crate::model::variant::ReadCounts;

const EPSILON: f64 = 1e-5;
const QUAD_TOL: f64 = 1e-8;
const QUAD_MAX_DEPTH: u32 = 16;

/// Log-domain relation priors, added to each relation's log evidence before
/// normalizing. `f64::NEG_INFINITY` fully disables a relation. Two
/// constructors match the two pipeline stages that call into the engine
/// (spec §4.1, §2 data flow): the clustered stage, where cocluster and
/// garbage never apply to already-formed superclusters, and the raw-variant
/// stage, where a small garbage prior absorbs sequencing artifacts.
#[derive(Debug, Clone, Copy)]
pub struct LogPrior {
    pub a_before_b: f64,
    pub b_before_a: f64,
    pub cocluster: f64,
    pub diff_branch: f64,
    pub garbage: f64,
}

impl LogPrior {
    /// Used between superclusters: cocluster and garbage are impossible by
    /// construction (superclusters are already-merged, already-filtered).
    pub fn clustered() -> Self {
        LogPrior {
            a_before_b: 0.0,
            b_before_a: 0.0,
            cocluster: f64::NEG_INFINITY,
            diff_branch: 0.0,
            garbage: f64::NEG_INFINITY,
        }
    }

    /// Used between raw variants before clustering: a small positive
    /// garbage prior lets sequencing artifacts get absorbed rather than
    /// forced into a spurious relation with a real variant.
    pub fn variant_stage() -> Self {
        LogPrior {
            a_before_b: 0.0,
            b_before_a: 0.0,
            cocluster: 0.0,
            diff_branch: 0.0,
            garbage: 0.001_f64.ln(),
        }
    }

    fn get(&self, r: RelType) -> f64 {
        match r {
            RelType::ABeforeB => self.a_before_b,
            RelType::BBeforeA => self.b_before_a,
            RelType::Cocluster => self.cocluster,
            RelType::DiffBranch => self.diff_branch,
            RelType::Garbage => self.garbage,
        }
    }
}

/// Per-sample binomial likelihood curve `L(phi) = Binom(v | n, clip(omega *
/// phi))`, summed in log-space across samples then exponentiated once at the
/// point of use so the quadrature integrand stays a plain probability
/// density.
fn log_likelihood_curve<T: ReadCounts>(item: &T) -> impl Fn(f64) -> f64 + '_ {
    move |phi: f64| {
        let mut llh = 0.0;
        for s in 0..item.nsamples() {
            let p = clip(item.omega_v()[s] * phi, EPSILON);
            llh += log_binomial_pmf(item.var_reads()[s], item.ref_reads()[s] + item.var_reads()[s], p, EPSILON);
        }
        llh.exp()
    }
}

/// `integral_0^1 L(phi) dphi`: the marginal evidence for `item` alone, under
/// a flat prior on its own subclone frequency.
fn marginal_evidence<T: ReadCounts>(item: &T) -> f64 {
    let l = log_likelihood_curve(item);
    quadrature::adaptive_simpson(&l, 0.0, 1.0, QUAD_TOL, QUAD_MAX_DEPTH)
}

/// `integral_0^1 L_anc(x) * (integral_0^x L_desc(t) dt) dx`: evidence for
/// "`anc` is ancestral to `desc`" under the constraint that a descendant's
/// subclone frequency can never exceed its ancestor's.
fn evidence_ancestral<T: ReadCounts>(anc: &T, desc: &T) -> f64 {
    let l_anc = log_likelihood_curve(anc);
    let l_desc = log_likelihood_curve(desc);
    let outer = |x: f64| {
        let inner = quadrature::adaptive_simpson(&l_desc, 0.0, x, QUAD_TOL, QUAD_MAX_DEPTH);
        l_anc(x) * inner
    };
    quadrature::adaptive_simpson(&outer, 0.0, 1.0, QUAD_TOL, QUAD_MAX_DEPTH)
}

/// `integral_0^1 L_i(t) * L_j(t) dt`: evidence for "`i` and `j` share a
/// single subclone frequency" (the cocluster hypothesis collapses the 2D
/// integral onto the diagonal).
fn evidence_cocluster<T: ReadCounts>(i: &T, j: &T) -> f64 {
    let l_i = log_likelihood_curve(i);
    let l_j = log_likelihood_curve(j);
    let joint = |t: f64| l_i(t) * l_j(t);
    quadrature::adaptive_simpson(&joint, 0.0, 1.0, QUAD_TOL, QUAD_MAX_DEPTH)
}

/// Unnormalized evidence for all 5 relation hypotheses between `i` and `j`,
/// in `RelType` discriminant order.
fn pairwise_evidence<T: ReadCounts>(i: &T, j: &T) -> [f64; NUM_REL_TYPES] {
    let marg_i = marginal_evidence(i);
    let marg_j = marginal_evidence(j);
    let mut out = [0.0; NUM_REL_TYPES];
    out[RelType::ABeforeB.index()] = evidence_ancestral(i, j);
    out[RelType::BBeforeA.index()] = evidence_ancestral(j, i);
    out[RelType::Cocluster.index()] = evidence_cocluster(i, j);
    out[RelType::DiffBranch.index()] = marg_i * marg_j;
    // No joint constraint and no shared signal: garbage's evidence is
    // "either variant alone looks like reasonable read-count data",
    // independent of whatever relation the other one has to anything else.
    out[RelType::Garbage.index()] = 0.5 * (marg_i + marg_j);
    out
}

/// Combine log-evidence and log-prior per relation, then normalize into a
/// categorical distribution over the 5 relation types plus the total
/// (log-space) evidence for the pair.
fn combine_and_normalize(evidence: [f64; NUM_REL_TYPES], prior: &LogPrior) -> ([f64; NUM_REL_TYPES], f64) {
    let mut log_unnorm = [f64::NEG_INFINITY; NUM_REL_TYPES];
    for r in 0..NUM_REL_TYPES {
        let rel = rel_type_from_index(r);
        let log_prior = prior.get(rel);
        if log_prior.is_finite() && evidence[r] > 0.0 {
            log_unnorm[r] = evidence[r].ln() + log_prior;
        }
    }

    let max = log_unnorm.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    assert!(max.is_finite(), "every relation has zero evidence; prior disables all 5 outcomes");

    let sum_exp: f64 = log_unnorm.iter().map(|&x| (x - max).exp()).sum();
    let log_total = max + sum_exp.ln();

    let mut post = [0.0; NUM_REL_TYPES];
    for r in 0..NUM_REL_TYPES {
        post[r] = (log_unnorm[r] - log_total).exp();
    }
    (post, log_total)
}

fn rel_type_from_index(r: usize) -> RelType {
    match r {
        0 => RelType::ABeforeB,
        1 => RelType::BBeforeA,
        2 => RelType::Cocluster,
        3 => RelType::DiffBranch,
        4 => RelType::Garbage,
        _ => unreachable!("relation index out of range"),
    }
}

/// Compute the pairwise posterior tensor over `items`, plus the `K x K`
/// matrix of each pair's total log evidence (useful for diagnosing which
/// pairs the data constrains weakly). `parallel == 0` runs sequentially;
/// otherwise the off-diagonal cells are computed across a pool of that many
/// threads (spec §4.1, §9: "Don't reach for parallelism machinery unless the
/// workload needs it").
pub fn calc_posterior<T: ReadCounts + Sync>(
    items: &[T],
    prior: &LogPrior,
    parallel: usize,
) -> Result<(MutRel, Array2<f64>), Error> {
    if items.is_empty() {
        return Err(Error::EmptyVariantCatalog);
    }

    let k = items.len();
    let vids: Vec<String> = items.iter().map(|i| i.id().to_string()).collect();
    let mut mutrel = MutRel::zeroed(vids);
    let mut evidence = Array2::<f64>::zeros((k, k));

    let pairs: Vec<(usize, usize)> = (0..k).flat_map(|i| (0..k).map(move |j| (i, j))).filter(|&(i, j)| i != j).collect();

    let compute = |&(i, j): &(usize, usize)| -> (usize, usize, [f64; NUM_REL_TYPES], f64) {
        let raw = pairwise_evidence(&items[i], &items[j]);
        let (post, log_total) = combine_and_normalize(raw, prior);
        (i, j, post, log_total)
    };

    let results: Vec<(usize, usize, [f64; NUM_REL_TYPES], f64)> = if parallel > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallel)
            .build()
            .expect("failed to build rayon thread pool");
        pool.install(|| pairs.par_iter().map(compute).collect())
    } else {
        pairs.iter().map(compute).collect()
    };

    for (i, j, post, log_total) in results {
        for r in 0..NUM_REL_TYPES {
            mutrel.rels[[i, j, r]] = post[r];
        }
        evidence[[i, j]] = log_total;
    }

    mutrel.assert_invariants();
    Ok((mutrel, evidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::variant::Variant;

    fn strong_variant(id: &str, v: u32, n: u32) -> Variant {
        Variant {
            id: id.to_string(),
            var_reads: vec![v],
            ref_reads: vec![n - v],
            omega_v: vec![1.0],
        }
    }

    #[test]
    fn posterior_tensor_satisfies_invariants() {
        let items = vec![strong_variant("A", 50, 100), strong_variant("B", 20, 100)];
        let (mutrel, evidence) = calc_posterior(&items, &LogPrior::variant_stage(), 0).unwrap();
        mutrel.assert_invariants();
        assert!(evidence[[0, 1]].is_finite());
    }

    #[test]
    fn empty_catalog_is_an_error() {
        let items: Vec<Variant> = vec![];
        assert_eq!(calc_posterior(&items, &LogPrior::clustered(), 0).unwrap_err(), Error::EmptyVariantCatalog);
    }

    #[test]
    fn ancestral_relation_dominates_when_b_is_nested_in_a() {
        // A is present at ~80% VAF, B at ~20%: B nested under A is far more
        // consistent with the data than the reverse.
        let items = vec![strong_variant("A", 80, 100), strong_variant("B", 20, 100)];
        let (mutrel, _) = calc_posterior(&items, &LogPrior::clustered(), 0).unwrap();
        let a_before_b = mutrel.rels[[0, 1, RelType::ABeforeB.index()]];
        let b_before_a = mutrel.rels[[0, 1, RelType::BBeforeA.index()]];
        assert!(a_before_b > b_before_a, "A_B={} B_A={}", a_before_b, b_before_a);
    }

    #[test]
    fn clustered_prior_fully_disables_cocluster_and_garbage() {
        let items = vec![strong_variant("A", 50, 100), strong_variant("B", 50, 100)];
        let (mutrel, _) = calc_posterior(&items, &LogPrior::clustered(), 0).unwrap();
        assert_eq!(mutrel.rels[[0, 1, RelType::Cocluster.index()]], 0.0);
        assert_eq!(mutrel.rels[[0, 1, RelType::Garbage.index()]], 0.0);
    }

    #[test]
    fn sequential_and_parallel_execution_agree() {
        let items = vec![
            strong_variant("A", 70, 100),
            strong_variant("B", 40, 100),
            strong_variant("C", 10, 100),
        ];
        let (seq, _) = calc_posterior(&items, &LogPrior::clustered(), 0).unwrap();
        let (par, _) = calc_posterior(&items, &LogPrior::clustered(), 2).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                for r in 0..NUM_REL_TYPES {
                    assert!((seq.rels[[i, j, r]] - par.rels[[i, j, r]]).abs() < 1e-9);
                }
            }
        }
    }
}
