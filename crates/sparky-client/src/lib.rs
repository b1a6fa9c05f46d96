//! Rate-limited, paginating client for the Spark REST API.
//!
//! The [`Engine`] is the only entry point callers need:
//!
//! ```no_run
//! use sparky_client::{Engine, EngineConfig};
//! use sparky_core::{RequestSpec, Resource};
//!
//! # async fn run() -> Result<(), sparky_client::EngineError> {
//! let engine = Engine::new(EngineConfig::new("my-token"))?;
//! let rooms = engine
//!     .perform(RequestSpec::get(Resource::Rooms).with_max_results(50))
//!     .await?;
//! println!("{} rooms", rooms.into_list().unwrap_or_default().len());
//! # Ok(())
//! # }
//! ```
//!
//! Internally every physical request goes through a [`Scheduler`] lane,
//! every response through the [`classifier`], and collection reads through
//! the [`paginator`].

pub mod cancel;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod paginator;
pub mod scheduler;
pub mod transport;

#[cfg(test)]
mod testing;

pub use cancel::{CancelHandle, CancelSignal};
pub use config::{DEFAULT_API_URL, EngineConfig, LaneConfig};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, TransportError};
pub use events::{EngineEvent, EventSink};
pub use scheduler::{Lane, LaneKind, Scheduler};
pub use transport::{BoxFuture, ReqwestTransport, RequestBody, Transport, TransportRequest, TransportResponse};
