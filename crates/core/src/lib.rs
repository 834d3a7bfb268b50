//! carpark-core: parking lot domain library.
//!
//! Defines the vocabulary shared by every carpark crate:
//!
//! - [`ParkingSpace`] and its [`SpaceStatus`] / [`VehicleType`] /
//!   [`Reservation`] satellites
//! - [`HistoryEntry`] -- the append-only status history record
//! - [`Session`] and [`Alert`] records
//! - [`generate_layout()`] -- the zone-balanced lot layout generator
//!
//! Everything here is pure data plus a little construction logic; state
//! transitions and persistence live in `carpark-engine` and
//! `carpark-storage`.

pub mod alert;
pub mod history;
pub mod layout;
pub mod session;
pub mod space;

// ── Convenience re-exports: key types ────────────────────────────────

pub use alert::{Alert, AlertPriority};
pub use history::{ChangedBy, HistoryAction, HistoryEntry, HistoryMetadata};
pub use layout::{generate_layout, LayoutError, DEFAULT_ZONE_COUNT, MAX_SPACES, MAX_ZONES};
pub use session::{Session, SessionStatus, Vehicle};
pub use space::{normalize_plate, ParkingSpace, Reservation, SpaceStatus, VehicleType, RESERVATION_TTL};
