//! Model weights resolution.
//!
//! Weights are looked up by file name across an ordered list of search
//! roots, then a local cache directory, then an optional HTTP mirror.
//! The process-wide store backs [`fetch_weights`], which the launch path
//! and the console both go through.

mod error;
mod fetch;
mod store;

pub use error::WeightsError;
pub use fetch::{fetch_weights, global_store, set_global_store};
pub use store::{ModelWeights, WeightsStore, WEIGHTS_DIR_ENV, WEIGHTS_TOKEN_ENV};
