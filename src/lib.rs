//! loadsmith: a screen-based HTTP load generator.
//!
//! Virtual users are state-bearing agents walking a step-tree of named
//! screens. Each screen drives the user's [`http::Context`]; every request
//! lands as a metric in the shared [`stats::Stats`] aggregator, which emits
//! live snapshots to the terminal or the web dashboard and a final JSON
//! report.
//!
//! Embedding sketch:
//!
//! ```no_run
//! use std::sync::Arc;
//! use loadsmith::{Configuration, Context, Registry, Runner, ScreenFuture};
//!
//! fn home(ctx: &mut Context) -> ScreenFuture<'_> {
//!     Box::pin(async move {
//!         ctx.get("/").send().await;
//!         Ok(())
//!     })
//! }
//!
//! # async fn demo() -> loadsmith::error::AppResult<()> {
//! let mut registry = Registry::new(Configuration::with_base_url("http://localhost:3000")?);
//! registry.add_screen("home", home);
//! registry.add_scenario("main", |b| {
//!     b.visit("home").think(1.0..3.0);
//! })?;
//!
//! let runner = Runner::new(Arc::new(registry), "main")?;
//! let summary = runner.run().await;
//! println!("{} requests", summary.total_requests);
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod args;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod executor;
pub mod http;
pub mod logger;
pub mod registry;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod shutdown;
pub mod stats;

pub use access::Access;
pub use config::Configuration;
pub use executor::Executor;
pub use http::{Context, Response};
pub use registry::{Registry, ScreenFn, ScreenFuture};
pub use runner::{RunState, Runner};
pub use scenario::ScenarioBuilder;
pub use stats::{Snapshot, Stats, Summary};
