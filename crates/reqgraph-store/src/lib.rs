//! SQLite persistence for the requirements graph store.
//!
//! The durable pieces: schema migrations, the per-kind store codecs over a
//! transactional connection, a worker pool that runs every save and load as
//! a task, the save traversal, the graph factory that rebuilds a graph from
//! a root identifier, the graph listing, and node removal.

pub mod codec;
pub mod database;
pub mod error;
pub mod factory;
pub mod locator;
pub mod pool;
pub mod remove;
pub mod save;
pub mod schema;
pub mod signal;

pub use codec::{codec_by_name, codec_for, Direction, KindCodec};
pub use database::Database;
pub use error::StoreError;
pub use factory::{LoadEvent, LoadGraph};
pub use locator::{GraphListing, GraphLocator};
pub use pool::{PoolState, Task, WorkerPool};
pub use remove::RemoveNodes;
pub use save::{SaveEvent, SaveNodes};
pub use signal::Signal;
