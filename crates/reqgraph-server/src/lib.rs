//! REST surface for the requirements graph store.
//!
//! Three endpoints on top of the persistence engine: `GET /graphs` lists
//! locator records, `GET /graph/{id}` synchronously loads and serializes a
//! whole graph, `POST /graph/{id}` ingests a graph archive and enqueues an
//! asynchronous save.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use error::{ApiError, ServerError};
pub use router::build_router;
pub use server::{GraphServer, ServerConfig};
pub use state::AppState;
