//! # Mirage
//!
//! A deterministic mock of a cloud compute control plane, for testing
//! clients against a fake backend without a real cloud provider.
//!
//! The core is a behavior-override engine: test authors register custom,
//! criteria-matched creation behaviors (or force one through magic metadata
//! keys on a request), and a virtual clock drives delayed lifecycle
//! transitions deterministically.
//!
//! ## Example Usage
//!
//! ```rust
//! use mirage::ComputeSession;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), serde_json::Error> {
//! let mut session = ComputeSession::with_seed(42);
//! let absolutize = |path: &str| format!("http://mirage.test/{path}");
//!
//! let request: mirage::CreateServerRequest = serde_json::from_value(json!({
//!     "server": {
//!         "name": "web-1",
//!         "metadata": {"server_building": "5"},
//!         "flavorRef": "2",
//!         "imageRef": "img-1"
//!     }
//! }))?;
//!
//! let response = session
//!     .tenant("tenant")
//!     .collection_for_region("ORD")
//!     .request_creation(&request, &absolutize);
//! assert_eq!(response.status, 202);
//!
//! // The server stays in BUILD until the clock has advanced far enough.
//! session.advance(Duration::from_secs(5));
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// The behavior-override engine: criteria, registries, creators, and the
/// metadata override resolver.
pub mod behavior;
/// The virtual clock driving delayed state transitions.
pub mod clock;
/// Server collections per tenant and region, and the owning session.
pub mod collection;
/// Injectable randomness for reproducible entity generation.
pub mod entropy;
/// Error types.
pub mod error;
/// Typed creation-request model.
pub mod request;
/// Response values produced by simulated operations.
pub mod response;
/// The simulated server entity and its payloads.
pub mod server;
/// Scheduled status transitions and their deterministic queue.
pub mod transition;

// Public API exports
pub use behavior::{
    default_create_behavior, default_with_hook, metadata_criterion, metadata_override,
    regex_criterion, server_creation, BehaviorRegistry, CreateBehavior, Criterion,
    EventDescription,
};
pub use clock::VirtualClock;
pub use collection::{ComputeSession, GlobalServerCollections, RegionalServerCollection};
pub use entropy::{Entropy, EntropySource, SeededEntropy};
pub use error::{BehaviorError, ValidationError};
pub use request::{CreateServerRequest, ServerSpec};
pub use response::{ApiResponse, UrlResolver};
pub use server::{Address, DiskConfig, Server, ServerStatus};
pub use transition::{ScheduledTransition, StatusTransition, TransitionQueue};
