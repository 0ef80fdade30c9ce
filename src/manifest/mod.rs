//! Desired state model: the manifest emitted by the build step, and the persisted
//! manifest document kept in the remote store.

mod defs;
mod errors;
mod impls;

pub use defs::*;
pub use errors::*;
