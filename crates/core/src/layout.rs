//! Lot layout generation.
//!
//! Produces a fresh set of free spaces split across lettered zones. The
//! split is deterministic: each zone takes `ceil(total / zones)` spaces in
//! zone order until the total is reached, so trailing zones may come up
//! short (or empty). Vehicle types are drawn independently per space at
//! 70% car / 20% truck / 10% motorcycle from the caller's RNG, which keeps
//! the draw seedable in tests.

use rand::Rng;
use time::OffsetDateTime;

use crate::space::{ParkingSpace, VehicleType};

/// Upper bound on `total_spaces` accepted by [`generate_layout`].
pub const MAX_SPACES: usize = 10_000;

/// Zones are single letters, so at most 26.
pub const MAX_ZONES: usize = 26;

/// Zone count used when the caller does not ask for one.
pub const DEFAULT_ZONE_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("total spaces must be between 1 and {MAX_SPACES}, got {0}")]
    InvalidSpaceCount(usize),

    #[error("zone count must be between 1 and {MAX_ZONES}, got {0}")]
    InvalidZoneCount(usize),
}

/// Generate `total_spaces` free spaces across the first `zone_count` zone
/// letters, numbered `{zone}001`, `{zone}002`, ... within each zone.
pub fn generate_layout<R: Rng + ?Sized>(
    total_spaces: usize,
    zone_count: usize,
    rng: &mut R,
    now: OffsetDateTime,
) -> Result<Vec<ParkingSpace>, LayoutError> {
    if total_spaces == 0 || total_spaces > MAX_SPACES {
        return Err(LayoutError::InvalidSpaceCount(total_spaces));
    }
    if zone_count == 0 || zone_count > MAX_ZONES {
        return Err(LayoutError::InvalidZoneCount(zone_count));
    }

    let per_zone = total_spaces.div_ceil(zone_count);
    let mut spaces = Vec::with_capacity(total_spaces);

    'zones: for z in 0..zone_count {
        let zone = (b'A' + z as u8) as char;
        for i in 1..=per_zone {
            if spaces.len() == total_spaces {
                break 'zones;
            }
            let number = format!("{zone}{i:03}");
            spaces.push(ParkingSpace::new(number, zone, draw_vehicle_type(rng), now));
        }
    }

    Ok(spaces)
}

/// 70% car, 20% truck, 10% motorcycle.
fn draw_vehicle_type<R: Rng + ?Sized>(rng: &mut R) -> VehicleType {
    let draw: f64 = rng.gen();
    if draw < 0.7 {
        VehicleType::Car
    } else if draw < 0.9 {
        VehicleType::Truck
    } else {
        VehicleType::Motorcycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::SpaceStatus;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use time::macros::datetime;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn now() -> OffsetDateTime {
        datetime!(2026-03-01 09:00 UTC)
    }

    #[test]
    fn ten_spaces_across_five_zones_gives_two_per_zone() {
        let spaces = generate_layout(10, 5, &mut rng(), now()).unwrap();
        assert_eq!(spaces.len(), 10);

        let numbers: Vec<&str> = spaces.iter().map(|s| s.number.as_str()).collect();
        assert_eq!(
            numbers,
            ["A001", "A002", "B001", "B002", "C001", "C002", "D001", "D002", "E001", "E002"]
        );
        for zone in ['A', 'B', 'C', 'D', 'E'] {
            assert_eq!(spaces.iter().filter(|s| s.zone == zone).count(), 2);
        }
        assert!(spaces.iter().all(|s| s.status == SpaceStatus::Free));
        assert!(spaces.iter().all(|s| s.reservation.is_none()));
        assert!(spaces.iter().all(|s| s.version == 0));
    }

    #[test]
    fn uneven_total_leaves_trailing_zones_short() {
        // ceil(7/3) = 3 per zone: A gets 3, B gets 3, C gets 1.
        let spaces = generate_layout(7, 3, &mut rng(), now()).unwrap();
        assert_eq!(spaces.len(), 7);
        assert_eq!(spaces.iter().filter(|s| s.zone == 'A').count(), 3);
        assert_eq!(spaces.iter().filter(|s| s.zone == 'B').count(), 3);
        assert_eq!(spaces.iter().filter(|s| s.zone == 'C').count(), 1);
        assert_eq!(spaces.last().unwrap().number, "C001");
    }

    #[test]
    fn trailing_zone_may_be_empty() {
        // ceil(4/3) = 2 per zone: A and B absorb all four, C gets none.
        let spaces = generate_layout(4, 3, &mut rng(), now()).unwrap();
        assert_eq!(spaces.len(), 4);
        assert!(spaces.iter().all(|s| s.zone != 'C'));
    }

    #[test]
    fn numbers_are_zero_padded_and_restart_per_zone() {
        let spaces = generate_layout(2000, 2, &mut rng(), now()).unwrap();
        assert_eq!(spaces[0].number, "A001");
        assert_eq!(spaces[999].number, "A1000");
        assert_eq!(spaces[1000].number, "B001");
    }

    #[test]
    fn out_of_range_arguments_rejected() {
        assert_eq!(
            generate_layout(0, 5, &mut rng(), now()),
            Err(LayoutError::InvalidSpaceCount(0))
        );
        assert_eq!(
            generate_layout(10_001, 5, &mut rng(), now()),
            Err(LayoutError::InvalidSpaceCount(10_001))
        );
        assert_eq!(
            generate_layout(10, 0, &mut rng(), now()),
            Err(LayoutError::InvalidZoneCount(0))
        );
        assert_eq!(
            generate_layout(10, 27, &mut rng(), now()),
            Err(LayoutError::InvalidZoneCount(27))
        );
    }

    #[test]
    fn type_draw_roughly_follows_ratios() {
        let spaces = generate_layout(10_000, 26, &mut rng(), now()).unwrap();
        let cars = spaces.iter().filter(|s| s.vehicle_type == VehicleType::Car).count();
        let trucks = spaces.iter().filter(|s| s.vehicle_type == VehicleType::Truck).count();
        let motos = spaces
            .iter()
            .filter(|s| s.vehicle_type == VehicleType::Motorcycle)
            .count();

        // Probabilistic draw, generous tolerances.
        assert!((6500..=7500).contains(&cars), "cars: {cars}");
        assert!((1500..=2500).contains(&trucks), "trucks: {trucks}");
        assert!((500..=1500).contains(&motos), "motorcycles: {motos}");
    }

    #[test]
    fn same_seed_gives_same_layout() {
        let a = generate_layout(50, 5, &mut StdRng::seed_from_u64(7), now()).unwrap();
        let b = generate_layout(50, 5, &mut StdRng::seed_from_u64(7), now()).unwrap();
        let types_a: Vec<_> = a.iter().map(|s| s.vehicle_type).collect();
        let types_b: Vec<_> = b.iter().map(|s| s.vehicle_type).collect();
        assert_eq!(types_a, types_b);
    }
}
