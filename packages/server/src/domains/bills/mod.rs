pub mod memory_store;
pub mod models;
pub mod normalize;
pub mod repository;
pub mod store;

pub use memory_store::MemoryBillStore;
pub use models::*;
pub use repository::BillRepository;
pub use store::{BillStore, PostgresBillStore};
