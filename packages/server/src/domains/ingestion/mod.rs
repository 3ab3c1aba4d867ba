pub mod actions;
pub mod details;
pub mod strategy;

pub use actions::{
    enqueue_all, enqueue_details, enqueue_scrape, scrape_source, EnqueuedJob, IngestJobHandler,
};
pub use details::{apply_details, scrape_bill_details, DetailsSummary};
pub use strategy::{extract, records_from_json, AttemptOutcome, Extraction};
