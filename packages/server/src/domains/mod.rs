// Business domains
pub mod bills;
pub mod ingestion;
pub mod sources;
