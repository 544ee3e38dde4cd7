//! Multi-chain orchestration: one OS thread per chain (spec §5), a
//! crossbeam progress channel the caller can drain for a progress bar, and
//! deterministic per-chain seeding via `crate::rng`.

pub mod chain;
pub mod weights;

use ndarray::Array2;

use crate::errors::Error;
use crate::hyperparams::Hyperparams;
use crate::model::mutrel::MutRel;
use crate::phi_fitter::PhiMethod;
use crate::result::ResultBundle;
use crate::rng::chain_rng;

/// Run `nchains` independent chains, each on its own OS thread, and
/// concatenate their post-burnin samples into one `ResultBundle`.
/// `burn_in_fraction` sets burn-in length as a fraction of the total
/// post-warmup iteration budget (`nsamples_per_chain * thin`); the
/// remainder is thinned by `thin` into `nsamples_per_chain` retained samples
/// per chain.
#[allow(clippy::too_many_arguments)]
pub fn sample_trees(
    v: &Array2<u32>,
    n: &Array2<u32>,
    omega: &Array2<f64>,
    data_mutrel: &MutRel,
    supercluster_vids: &[String],
    hyperparams: &Hyperparams,
    phi_method: PhiMethod,
    phi_iters: usize,
    nchains: usize,
    nsamples_per_chain: usize,
    thin: usize,
    burn_in_fraction: f64,
    base_seed: u64,
    progress: Option<crossbeam_channel::Sender<()>>,
) -> Result<ResultBundle, Error> {
    if nchains == 0 {
        return Err(Error::NoChainsRequested { nchains });
    }

    let burn_in = ((nsamples_per_chain * thin.max(1)) as f64 * burn_in_fraction).round() as usize;

    let mut all_samples = Vec::with_capacity(nchains * nsamples_per_chain);
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..nchains)
            .map(|chain_index| {
                let progress = progress.clone();
                let mut rng = chain_rng(base_seed, chain_index);
                scope.spawn(move || {
                    chain::run_chain(
                        v,
                        n,
                        omega,
                        data_mutrel,
                        supercluster_vids,
                        hyperparams,
                        phi_method,
                        phi_iters,
                        burn_in,
                        nsamples_per_chain,
                        thin,
                        &mut rng,
                        progress.as_ref(),
                    )
                })
            })
            .collect();

        for handle in handles {
            let chain_samples = handle.join().expect("chain thread panicked");
            all_samples.extend(chain_samples);
        }
    });

    Ok(ResultBundle {
        supercluster_vids: supercluster_vids.to_vec(),
        hyperparams: *hyperparams,
        nchains,
        base_seed,
        samples: all_samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::variant::Variant;
    use crate::pairwise::{calc_posterior, LogPrior};

    #[test]
    fn sample_trees_runs_multiple_chains_and_concatenates_results() {
        let items = vec![
            Variant { id: "S0".into(), var_reads: vec![60], ref_reads: vec![40], omega_v: vec![0.5] },
            Variant { id: "S1".into(), var_reads: vec![30], ref_reads: vec![70], omega_v: vec![0.5] },
        ];
        let (data_mutrel, _) = calc_posterior(&items, &LogPrior::clustered(), 0).unwrap();
        let v = Array2::<u32>::from_shape_vec((2, 1), vec![60, 30]).unwrap();
        let n = Array2::<u32>::from_shape_vec((2, 1), vec![100, 100]).unwrap();
        let omega = Array2::<f64>::from_elem((2, 1), 0.5);
        let vids = vec!["root".into(), "S0".into(), "S1".into()];
        let hp = Hyperparams::default();

        let bundle = sample_trees(&v, &n, &omega, &data_mutrel, &vids, &hp, PhiMethod::ProjRprop, 50, 3, 4, 2, 0.3, 0, None).unwrap();
        assert_eq!(bundle.samples.len(), 12);
        assert_eq!(bundle.nchains, 3);
    }

    #[test]
    fn zero_chains_is_an_error() {
        let items = vec![Variant { id: "S0".into(), var_reads: vec![1], ref_reads: vec![1], omega_v: vec![0.5] }];
        let (data_mutrel, _) = calc_posterior(
            &[items[0].clone(), Variant { id: "S1".into(), var_reads: vec![1], ref_reads: vec![1], omega_v: vec![0.5] }],
            &LogPrior::clustered(),
            0,
        )
        .unwrap();
        let v = Array2::<u32>::from_elem((1, 1), 1);
        let n = Array2::<u32>::from_elem((1, 1), 2);
        let omega = Array2::<f64>::from_elem((1, 1), 0.5);
        let vids = vec!["root".into(), "S0".into()];
        let hp = Hyperparams::default();
        let err = sample_trees(&v, &n, &omega, &data_mutrel, &vids, &hp, PhiMethod::ProjRprop, 10, 0, 1, 1, 0.3, 0, None).unwrap_err();
        assert_eq!(err, Error::NoChainsRequested { nchains: 0 });
    }
}
