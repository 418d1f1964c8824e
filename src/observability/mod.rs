//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows from the router middleware into every request span
//! - Metric updates are cheap enough to record unconditionally

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
