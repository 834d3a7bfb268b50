//! carpark-engine: the parking state machine over a `ParkStore`.
//!
//! [`ParkingService`] is the single entry point the API layer talks to:
//!
//! - lot generation (atomic registry replacement with creation history)
//! - the reservation/occupation state machine (reserve, occupy, release,
//!   cancel, out-of-service, in-service)
//! - history recorder queries (per space and paginated global)
//! - the expiry sweeper
//! - session lifecycle and occupancy stats
//!
//! Every mutation runs as one store transaction: the space update, its
//! history entry, and any side-effect records commit together or not at
//! all. Concurrent writers are serialized per space by the store's version
//! check; a lost race surfaces as [`ParkingError::InvalidTransition`].

mod error;
mod service;
mod session;
mod sweeper;
mod transition;

pub use error::ParkingError;
pub use service::{HistoryPage, ParkingService, ParkingStats, SessionPage, MAX_PAGE_LIMIT};
pub use sweeper::SweepOutcome;
