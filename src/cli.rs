//! Command-line surface (spec §6): three subcommands mirroring the pipeline
//! stages — the pairwise posterior alone, the full tree sampler, and the
//! fixed-structure bypass mode.

use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use structopt::StructOpt;

use crate::errors;
use crate::hyperparams::Hyperparams;
use crate::model::adjacency;
use crate::model::variant::{calc_binom_params, Supervariant, Variant};
use crate::pairwise::{calc_posterior, LogPrior};
use crate::phi_fitter::PhiMethod;
use crate::result::ResultBundle;
use crate::sampler::{chain, sample_trees};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "clonal-trees",
    about = "Reconstruct tumor clonal evolution trees from bulk SSM read counts.",
    setting = structopt::clap::AppSettings::ColoredHelp
)]
pub enum ClonalTrees {
    #[structopt(
        name = "calc-posterior",
        about = "Compute the pairwise relation posterior tensor between superclusters.",
        setting = structopt::clap::AppSettings::ColoredHelp
    )]
    CalcPosterior {
        #[structopt(long, parse(from_os_str), help = "JSON file of {id, var_reads, ref_reads, omega_v} variant records.")]
        ssm_file: PathBuf,
        #[structopt(long, parse(from_os_str), help = "JSON file listing variant-id clusters (index 0 reserved, ignored).")]
        clusters_file: PathBuf,
        #[structopt(long, parse(from_os_str), help = "Where to write the resulting MutRel tensor as JSON.")]
        output: PathBuf,
        #[structopt(long, default_value = "0", help = "Number of worker threads (0 = sequential).")]
        parallel: usize,
    },
    #[structopt(
        name = "sample",
        about = "Run the MCMC tree sampler.",
        setting = structopt::clap::AppSettings::ColoredHelp
    )]
    Sample {
        #[structopt(long, parse(from_os_str))]
        ssm_file: PathBuf,
        #[structopt(long, parse(from_os_str))]
        clusters_file: PathBuf,
        #[structopt(long, parse(from_os_str))]
        output: PathBuf,
        #[structopt(long, default_value = "1", help = "Number of independent MH chains.")]
        nchains: usize,
        #[structopt(long, default_value = "1000", help = "Retained (post-burnin, thinned) samples per chain.")]
        nsamples: usize,
        #[structopt(long, default_value = "1", help = "Keep every Nth post-burnin iteration.")]
        thin: usize,
        #[structopt(long, default_value = "0.3333", help = "Burn-in length as a fraction of the post-warmup iteration budget.")]
        burn_in_fraction: f64,
        #[structopt(long, default_value = "0", help = "Base RNG seed; chains derive distinct seeds from it.")]
        seed: u64,
        #[structopt(long, default_value = "proj_rprop", possible_values = &["graddesc", "rprop", "projection", "proj_rprop"])]
        phi_method: String,
        #[structopt(long, default_value = "100", help = "Iterations the phi fitter runs per proposed tree.")]
        phi_iters: usize,
        #[structopt(long, default_value = "0", help = "Worker threads for the up-front pairwise stage (0 = sequential).")]
        parallel: usize,
        #[structopt(long, help = "Override tau (depth weight in subtree proposal).")]
        tau: Option<f64>,
        #[structopt(long, help = "Override rho (mutrel-fit weight in subtree proposal and tree score).")]
        rho: Option<f64>,
        #[structopt(long, help = "Override theta (B_A weight in parent proposal).")]
        theta: Option<f64>,
        #[structopt(long, help = "Override kappa (depth weight in parent proposal).")]
        kappa: Option<f64>,
        #[structopt(long, help = "Override psi (peakedness of depth-based weighting).")]
        psi: Option<f64>,
    },
    #[structopt(
        name = "use-existing-structures",
        about = "Skip the topology search and fit phi against caller-supplied tree structures.",
        setting = structopt::clap::AppSettings::ColoredHelp
    )]
    UseExistingStructures {
        #[structopt(long, parse(from_os_str))]
        ssm_file: PathBuf,
        #[structopt(long, parse(from_os_str))]
        clusters_file: PathBuf,
        #[structopt(long, parse(from_os_str), help = "JSON file: a list of parent-index lists, one per structure.")]
        structures_file: PathBuf,
        #[structopt(long, parse(from_os_str))]
        output: PathBuf,
        #[structopt(long, default_value = "proj_rprop", possible_values = &["graddesc", "rprop", "projection", "proj_rprop"])]
        phi_method: String,
        #[structopt(long, default_value = "100")]
        phi_iters: usize,
    },
}

fn parse_phi_method(s: &str) -> PhiMethod {
    match s {
        "graddesc" => PhiMethod::GradDesc,
        "rprop" => PhiMethod::Rprop,
        "projection" => PhiMethod::Projection,
        "proj_rprop" => PhiMethod::ProjRprop,
        other => panic!("unknown phi method '{}'; structopt's possible_values should have rejected this", other),
    }
}

/// Load the variant catalog and build superclusters from the clusters file.
/// `clusters[0]` is reserved (garbage bin in the upstream convention) and
/// skipped; `clusters[1..]` become superclusters `S0..`.
fn load_superclusters(
    ssm_file: &PathBuf,
    clusters_file: &PathBuf,
) -> Result<(Vec<Supervariant>, Vec<String>), Box<dyn Error>> {
    let variants: Vec<Variant> = serde_json::from_reader(File::open(ssm_file)?)?;
    if variants.is_empty() {
        return Err(Box::new(errors::Error::EmptyVariantCatalog));
    }
    let catalog: BTreeMap<String, Variant> = variants.into_iter().map(|v| (v.id.clone(), v)).collect();

    let clusters: Vec<Vec<String>> = serde_json::from_reader(File::open(clusters_file)?)?;
    let mut supervars = Vec::with_capacity(clusters.len().saturating_sub(1));
    for (i, members) in clusters.iter().enumerate().skip(1) {
        supervars.push(Supervariant::from_cluster(i - 1, members, &catalog)?);
    }
    let svids: Vec<String> = supervars.iter().map(|s| s.id.clone()).collect();
    Ok((supervars, svids))
}

pub fn run(opt: ClonalTrees) -> Result<(), Box<dyn Error>> {
    match opt {
        ClonalTrees::CalcPosterior { ssm_file, clusters_file, output, parallel } => {
            let (supervars, svids) = load_superclusters(&ssm_file, &clusters_file)?;
            log::info!("computing pairwise posterior over {} superclusters", svids.len());
            let (mutrel, evidence) = calc_posterior(&supervars, &LogPrior::clustered(), parallel)?;
            let out = File::create(&output)?;
            serde_json::to_writer_pretty(BufWriter::new(out), &serde_json::json!({
                "mutrel": mutrel,
                "evidence": evidence,
            }))?;
        }
        ClonalTrees::Sample {
            ssm_file,
            clusters_file,
            output,
            nchains,
            nsamples,
            thin,
            burn_in_fraction,
            seed,
            phi_method,
            phi_iters,
            parallel,
            tau,
            rho,
            theta,
            kappa,
            psi,
        } => {
            let (supervars, svids) = load_superclusters(&ssm_file, &clusters_file)?;
            let supervars_by_id: BTreeMap<String, Supervariant> =
                supervars.into_iter().map(|s| (s.id.clone(), s)).collect();
            let (v, n, omega) = calc_binom_params(&supervars_by_id, &svids);

            log::info!("computing pairwise posterior over {} superclusters", svids.len());
            let items: Vec<Supervariant> = svids.iter().map(|id| supervars_by_id[id].clone()).collect();
            let (data_mutrel, _evidence) = calc_posterior(&items, &LogPrior::clustered(), parallel)?;

            let mut hp = Hyperparams::default();
            if let Some(x) = tau {
                hp.tau = x;
            }
            if let Some(x) = rho {
                hp.rho = x;
            }
            if let Some(x) = theta {
                hp.theta = x;
            }
            if let Some(x) = kappa {
                hp.kappa = x;
            }
            if let Some(x) = psi {
                hp.psi = x;
            }

            let mut full_vids = vec!["root".to_string()];
            full_vids.extend(svids.iter().cloned());

            log::info!("sampling {} chains, {} samples each", nchains, nsamples);
            let bundle: ResultBundle = sample_trees(
                &v,
                &n,
                &omega,
                &data_mutrel,
                &full_vids,
                &hp,
                parse_phi_method(&phi_method),
                phi_iters,
                nchains,
                nsamples,
                thin,
                burn_in_fraction,
                seed,
                None,
            )?;

            let out = File::create(&output)?;
            serde_json::to_writer_pretty(BufWriter::new(out), &bundle)?;
        }
        ClonalTrees::UseExistingStructures { ssm_file, clusters_file, structures_file, output, phi_method, phi_iters } => {
            let (supervars, svids) = load_superclusters(&ssm_file, &clusters_file)?;
            let supervars_by_id: BTreeMap<String, Supervariant> =
                supervars.into_iter().map(|s| (s.id.clone(), s)).collect();
            let (v, n, omega) = calc_binom_params(&supervars_by_id, &svids);

            let parent_lists: Vec<Vec<usize>> = serde_json::from_reader(File::open(&structures_file)?)?;
            let structures: Vec<_> = parent_lists.iter().map(|p| adjacency::from_parent_list(p)).collect();

            let samples = chain::use_existing_structures(&structures, &v, &n, &omega, parse_phi_method(&phi_method), phi_iters);
            let mut full_vids = vec!["root".to_string()];
            full_vids.extend(svids.iter().cloned());
            let bundle = ResultBundle {
                supercluster_vids: full_vids,
                hyperparams: Hyperparams::default(),
                nchains: 0,
                base_seed: 0,
                samples,
            };

            let out = File::create(&output)?;
            serde_json::to_writer_pretty(BufWriter::new(out), &bundle)?;
        }
    }
    Ok(())
}
