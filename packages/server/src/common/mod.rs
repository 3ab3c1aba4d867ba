// Common types and utilities shared across the application

pub mod error;
pub mod lenient;

pub use error::{IngestError, IngestResult};
