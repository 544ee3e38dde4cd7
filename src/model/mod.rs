//! The data model: variants/supervariants, adjacency matrices, the mutrel
//! tensor, and phi matrices (spec §3).

pub mod adjacency;
pub mod mutrel;
pub mod phi;
pub mod variant;

pub use mutrel::{MutRel, RelType};
pub use phi::Phi;
pub use variant::{ReadCounts, Supervariant, Variant};
