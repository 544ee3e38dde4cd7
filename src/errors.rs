use thiserror::Error;

/// Errors surfaced across the host boundary: malformed params, unknown
/// variant ids, malformed user-supplied structures. Invariant violations
/// inside the sampler are bugs, not recoverable conditions, and are
/// reported via `assert!` rather than through this enum (see §7 of
/// SPEC_FULL.md).
#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("unknown variant id '{id}' referenced in a cluster or garbage list")]
    UnknownVariantId { id: String },
    #[error("variant catalog is empty; cannot build a pairwise tensor or sample trees")]
    EmptyVariantCatalog,
    #[error("user-supplied adjacency list has {got} entries, expected {expected} (one parent per non-root node)")]
    MalformedStructure { got: usize, expected: usize },
    #[error("user-supplied structure names node {node} as its own parent")]
    SelfParentedNode { node: usize },
    #[error("requested {nchains} chains, need at least 1")]
    NoChainsRequested { nchains: usize },
    #[error("samples list is empty; at least one tissue sample is required")]
    NoSamples,
    #[error("variant '{id}' reports {got} samples, expected {expected} to match the rest of the catalog")]
    InconsistentSampleCount {
        id: String,
        got: usize,
        expected: usize,
    },
}
