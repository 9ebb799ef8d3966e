//! # CretoAI OR Guard
//!
//! Concurrent, short-circuiting OR over asynchronous authorization guards.
//!
//! ## Features
//!
//! - **Any-of semantics**: access is granted as soon as one guard approves
//! - **Concurrent evaluation** of every guard on the Tokio runtime
//! - **Short-circuit cancellation** of guards still running once the outcome is known
//! - **Three result shapes** per guard: immediate, deferred (future) or stream
//! - **Configurable error policy**: failures count as denials, or abort the evaluation
//! - **Pluggable guard lookup** through [`GuardLocator`], with an in-memory [`GuardRegistry`]
//! - **Metrics** with Prometheus text export
//!
//! ## Example
//!
//! ```rust
//! use cretoai_or_guard::{guard_fn, GuardRegistry, GuardResult, OrGuard, OrGuardConfig, Outcome};
//! use std::sync::Arc;
//!
//! struct Request {
//!     api_key: Option<String>,
//!     is_admin: bool,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(GuardRegistry::<Request>::new());
//!     registry.register("admin", guard_fn(|req: &Request| req.is_admin));
//!     registry.register("api-key", guard_fn(|req: &Request| {
//!         let valid = req.api_key.as_deref() == Some("secret");
//!         GuardResult::deferred(async move { Ok(valid) })
//!     }));
//!
//!     let guard = OrGuard::<Request>::build(["admin", "api-key"], OrGuardConfig::default(), registry)?;
//!
//!     let request = Request { api_key: Some("secret".to_string()), is_admin: false };
//!     assert_eq!(guard.evaluate(request).await?, Outcome::Granted);
//!
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod error;
pub mod guard;
pub mod policy;
pub mod locator;
pub mod engine;

// Re-export commonly used types
pub use types::{Evaluation, GuardId, Outcome, SwallowedFailure};
pub use error::{GuardError, Result};
pub use guard::{guard_fn, FnGuard, Guard, GuardFuture, GuardResult};
pub use policy::{ErrorPolicy, GuardVerdict};
pub use locator::{GuardLocator, GuardRegistry};
pub use engine::{CombinatorMetrics, MetricsCollector, OrGuard, OrGuardConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
