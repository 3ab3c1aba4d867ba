// Inbound surface and production wiring
pub mod app;
pub mod service;

pub use app::{build_deps, build_service};
pub use service::{EnqueueOptions, HealthSnapshot, IngestService};
