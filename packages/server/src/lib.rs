// Provincial Bills Tracker - Ingestion Core
//
// This crate pulls legislative bills from provincial legislature websites,
// normalizes them, and stores them for the dashboard. Scrapes run as durable
// jobs on a Postgres-backed queue with retry and backoff.
//
// Domain logic lives in domains/*; infrastructure and the job runtime in kernel/.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
