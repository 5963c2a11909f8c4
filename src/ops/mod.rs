// * Operations
// * Structured logging, Prometheus metrics, batch progress and the HTTP surface

pub mod server;
pub mod telemetry;

// * Re-exports for convenient access
pub use server::{parse_bind_addr, route, serve, ServerError, StartResponse, StartStatus};
pub use telemetry::{
    get_metrics_string, init_tracing, init_tracing_pretty, IngestionTelemetry, TelemetrySnapshot,
};
