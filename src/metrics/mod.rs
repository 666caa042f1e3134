//! Metrics module for Prometheus-based monitoring.
//!
//! Job outcomes, durations and queue depths are recorded through
//! [`MetricsCollector`]. The worker serves its registry on `/metrics`
//! when started with `--metrics-addr`; `stats --prometheus` renders the
//! queue-depth gauges from a one-off registry.
//!
//! # Example
//!
//! ```ignore
//! use styling_jobs::metrics::{export_metrics, init_metrics, MetricsCollector};
//!
//! init_metrics()?;
//! let collector = MetricsCollector::new();
//! collector.record_sync_products(48, 2);
//! println!("{}", export_metrics());
//! ```

pub mod collectors;
pub mod prometheus;
pub mod server;

pub use collectors::{JobOutcome, MetricsCollector};
pub use self::prometheus::{export_metrics, init_metrics};
pub use server::{metrics_handler, serve_metrics};

pub use self::prometheus::{
    JOBS_IN_PROGRESS, JOBS_TOTAL, JOB_DURATION, QUEUE_DEPTH, REGISTRY, SYNC_PRODUCTS_TOTAL,
};
