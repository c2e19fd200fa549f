//! ligandml-model — Per-job potency regressors.
//!
//! - [`PotencyRegressor`]: linear Candle model with one-step SGD training
//! - [`WeightStore`]: safetensors persistence keyed by job id, seeded from base weights
//! - [`WeightCache`]: LRU of recently used job weights
//!
//! # Example
//!
//! ```rust,no_run
//! use ligandml_model::{WeightCache, WeightStore, DEFAULT_INPUT_DIM};
//!
//! fn main() -> ligandml_model::Result<()> {
//!     let store = WeightStore::open("./weights", DEFAULT_INPUT_DIM, WeightCache::new(16))?;
//!     store.ensure_base()?;
//!
//!     let features = [0.1_f32; DEFAULT_INPUT_DIM];
//!     let before = store.update(7, |model| model.train_step(&features, 4.2, 0.01))?;
//!     let (model, _) = store.load_or_init(7)?;
//!     println!("{before} -> {}", model.predict(&features)?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod regressor;
pub mod store;

pub use cache::{CachedModel, CachedWeight, WeightCache};
pub use error::{ModelError, Result};
pub use regressor::{PotencyRegressor, WeightSnapshot, DEFAULT_INPUT_DIM, DEFAULT_LEARNING_RATE};
pub use store::{WeightOrigin, WeightStore, BASE_WEIGHT_FILE};
