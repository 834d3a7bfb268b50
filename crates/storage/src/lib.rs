pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StoreError;
pub use memory::{MemoryStore, MemoryTxn};
pub use record::{SessionFilter, SessionUpdate, SpaceFilter, SpaceUpdate};
pub use traits::ParkStore;
