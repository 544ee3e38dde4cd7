use std::collections::BTreeMap;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// A single somatic variant's per-sample read counts and VAF scaling.
///
/// `var_reads`, `ref_reads` and `omega_v` are all indexed by sample; all
/// three must have the same length (`S`, the run's sample count).
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct Variant {
    #[builder(setter(into))]
    pub id: String,
    pub var_reads: Vec<u32>,
    pub ref_reads: Vec<u32>,
    pub omega_v: Vec<f64>,
}

impl Variant {
    pub fn nsamples(&self) -> usize {
        self.var_reads.len()
    }

    pub fn total_reads(&self) -> Vec<u32> {
        self.var_reads
            .iter()
            .zip(&self.ref_reads)
            .map(|(v, r)| v + r)
            .collect()
    }
}

/// A variant-shaped object whose read counts are the element-wise sum over
/// the members of a cluster. `omega` is fixed at 0.5: a precondition the
/// sampler asserts (spec §3, §8 scenario 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supervariant {
    pub id: String,
    pub var_reads: Vec<u32>,
    pub ref_reads: Vec<u32>,
    pub omega_v: Vec<f64>,
}

impl Supervariant {
    /// Sum the read counts of `members` (in `catalog`) into a single
    /// supervariant named `S{index}`.
    pub fn from_cluster(
        index: usize,
        members: &[String],
        catalog: &BTreeMap<String, Variant>,
    ) -> Result<Self, Error> {
        let mut var_reads: Option<Vec<u32>> = None;
        let mut ref_reads: Option<Vec<u32>> = None;
        let mut nsamples = 0;

        for vid in members {
            let v = catalog
                .get(vid)
                .ok_or_else(|| Error::UnknownVariantId { id: vid.clone() })?;
            if var_reads.is_none() {
                nsamples = v.nsamples();
                var_reads = Some(vec![0; nsamples]);
                ref_reads = Some(vec![0; nsamples]);
            } else if v.nsamples() != nsamples {
                return Err(Error::InconsistentSampleCount {
                    id: vid.clone(),
                    got: v.nsamples(),
                    expected: nsamples,
                });
            }
            let vr = var_reads.as_mut().unwrap();
            let rr = ref_reads.as_mut().unwrap();
            for s in 0..nsamples {
                vr[s] += v.var_reads[s];
                rr[s] += v.ref_reads[s];
            }
        }

        let nsamples = var_reads.as_ref().map(|v| v.len()).unwrap_or(0);
        Ok(Supervariant {
            id: format!("S{}", index),
            var_reads: var_reads.unwrap_or_default(),
            ref_reads: ref_reads.unwrap_or_default(),
            omega_v: vec![0.5; nsamples],
        })
    }

    pub fn nsamples(&self) -> usize {
        self.var_reads.len()
    }

    pub fn total_reads(&self) -> Vec<u32> {
        self.var_reads
            .iter()
            .zip(&self.ref_reads)
            .map(|(v, r)| v + r)
            .collect()
    }

    fn assert_omega_precondition(&self) {
        assert!(
            self.omega_v.iter().all(|&w| (w - 0.5).abs() < 1e-12),
            "supervariant {} has omega != 0.5; the sampler's binomial parameterisation assumes \
             supervariant omega is always 0.5 (spec §3, §8 scenario 6)",
            self.id
        );
    }
}

/// Shared read-count accessors for both `Variant` and `Supervariant`, so the
/// pairwise engine can operate over either (spec §4.1: "a list of variants
/// (or supervariants)").
pub trait ReadCounts {
    fn id(&self) -> &str;
    fn var_reads(&self) -> &[u32];
    fn ref_reads(&self) -> &[u32];
    fn omega_v(&self) -> &[f64];

    fn nsamples(&self) -> usize {
        self.var_reads().len()
    }
}

impl ReadCounts for Variant {
    fn id(&self) -> &str {
        &self.id
    }
    fn var_reads(&self) -> &[u32] {
        &self.var_reads
    }
    fn ref_reads(&self) -> &[u32] {
        &self.ref_reads
    }
    fn omega_v(&self) -> &[f64] {
        &self.omega_v
    }
}

impl ReadCounts for Supervariant {
    fn id(&self) -> &str {
        &self.id
    }
    fn var_reads(&self) -> &[u32] {
        &self.var_reads
    }
    fn ref_reads(&self) -> &[u32] {
        &self.ref_reads
    }
    fn omega_v(&self) -> &[f64] {
        &self.omega_v
    }
}

/// `(V, N, omega_v)` stacked over all non-root superclusters, in
/// supercluster order. Asserts the omega=0.5 precondition on every
/// supervariant (spec §8 scenario 6): this is a bug-class failure, not a
/// recoverable one.
pub fn calc_binom_params(
    supervars: &BTreeMap<String, Supervariant>,
    svids: &[String],
) -> (ndarray::Array2<u32>, ndarray::Array2<u32>, ndarray::Array2<f64>) {
    let k = svids.len();
    assert!(k > 0, "calc_binom_params called with no supervariants");
    let s = supervars[&svids[0]].nsamples();

    let mut v = ndarray::Array2::<u32>::zeros((k, s));
    let mut n = ndarray::Array2::<u32>::zeros((k, s));
    let mut omega = ndarray::Array2::<f64>::zeros((k, s));

    for (row, svid) in svids.iter().enumerate() {
        let sv = &supervars[svid];
        sv.assert_omega_precondition();
        assert_eq!(sv.nsamples(), s, "inconsistent sample count across supervariants");
        for col in 0..s {
            v[[row, col]] = sv.var_reads[col];
            n[[row, col]] = sv.var_reads[col] + sv.ref_reads[col];
            omega[[row, col]] = sv.omega_v[col];
        }
    }

    (v, n, omega)
}
