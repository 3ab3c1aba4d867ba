//! Kernel module - infrastructure, dependencies, and the job runtime.

pub mod admission;
pub mod deps;
pub mod firecrawl_client;
pub mod jobs;
pub mod scheduled_tasks;
pub mod simple_scraper;
pub mod test_dependencies;
pub mod traits;

pub use admission::AdmissionControl;
pub use deps::{IngestSettings, ServerDeps};
pub use firecrawl_client::FirecrawlExtractor;
pub use simple_scraper::SimpleScraper;
pub use test_dependencies::TestDependencies;
pub use traits::*;
