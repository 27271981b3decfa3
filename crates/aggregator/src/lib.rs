//! Result aggregation.
//!
//! The consuming loop owns the [`ResultStore`] outright. Every decoded
//! result is inserted and acknowledged immediately. On a fixed tick the loop
//! sends an immutable [`ResultSnapshot`] over a channel to the rendering
//! side, so readers never share the live store.
//!
//! ```text
//! resultQueue ──► ResultAggregator ──(Arc<ResultSnapshot>, every 1s)──► Renderer
//!                   owns ResultStore
//! ```

mod aggregator;
mod config;
mod render;
mod snapshot;
mod store;

pub use aggregator::{AggregatorError, ResultAggregator};
pub use config::AggregatorConfig;
pub use render::{spawn_renderer, LogRenderer, Renderer};
pub use snapshot::{Histogram, ResultSnapshot};
pub use store::{InsertOutcome, ResultStore};
