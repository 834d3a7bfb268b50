//! Shared application state.

use carpark_engine::ParkingService;
use carpark_storage::MemoryStore;

/// State handed to every handler. The store is injected into the service
/// at startup; handlers never touch it directly.
pub(crate) struct AppState {
    pub(crate) service: ParkingService<MemoryStore>,
}
