pub mod credentials;
pub mod records;
pub mod retry;
pub mod store;

pub use records::{ScooterRecord, UserRecord};
pub use retry::with_retry;
pub use store::{FileStore, MemoryStore, Store};
