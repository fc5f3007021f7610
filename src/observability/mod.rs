//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline, tracker, transport produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stderr
//!     → Prometheus scrape endpoint (binary only, when enabled)
//! ```
//!
//! Private keys and passwords never reach either sink.

pub mod logging;
pub mod metrics;
