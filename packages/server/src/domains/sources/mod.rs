pub mod registry;
pub mod selectors;

pub use registry::{ResolvedSource, SelectorRules, SourceConfig, SourceRegistry, SourceUrls};
pub use selectors::parse_bills;
