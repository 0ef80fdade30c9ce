pub mod backend;
pub mod config;
pub mod consts;
pub mod directory;
pub mod execution;
pub mod fingerprint;
pub mod manifest;
pub mod reconciler;
pub mod router;
pub mod store;
pub mod utils;
