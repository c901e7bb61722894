//! Presentation helpers for map front ends: team colours and pin placement.

use crate::zone::{TeamId, ZoneId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const TEAM_PALETTE: [&str; 8] = [
    "#E74C3C", "#8E44AD", "#3498DB", "#1ABC9C", "#F1C40F", "#E67E22", "#34495E", "#95A5A6",
];

pub const UNASSIGNED_COLOR: &str = "#BDBDBD";

/// Maximum pin displacement per axis, in degrees (~165 m).
pub const PIN_JITTER: f64 = 0.0015;

pub fn team_color(team_id: TeamId) -> &'static str {
    match team_id {
        0 => UNASSIGNED_COLOR,
        t => TEAM_PALETTE[(t as usize - 1) % TEAM_PALETTE.len()],
    }
}

/// Stable `(dx, dy)` offset for the `ordinal`-th pin inside a zone, so pins
/// without exact coordinates do not stack on the zone centroid.
pub fn pin_offset(zone_id: ZoneId, ordinal: usize) -> (f64, f64) {
    let seed = (zone_id as u64).wrapping_add(ordinal as u64);
    let mut rng = StdRng::seed_from_u64(seed);
    (
        rng.random_range(-PIN_JITTER..=PIN_JITTER),
        rng.random_range(-PIN_JITTER..=PIN_JITTER),
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinPrecision {
    Exact,
    Estimated,
}

/// A map marker in lon/lat degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub lon: f64,
    pub lat: f64,
    pub precision: PinPrecision,
}

/// Uses `exact` when it is a real location (non-zero latitude and longitude),
/// otherwise jitters around `anchor`, typically the zone centroid.
pub fn place_pin(anchor: (f64, f64), exact: Option<(f64, f64)>, zone_id: ZoneId, ordinal: usize) -> Pin {
    match exact {
        Some((lon, lat)) if lon != 0.0 && lat != 0.0 => Pin {
            lon,
            lat,
            precision: PinPrecision::Exact,
        },
        _ => {
            let (dx, dy) = pin_offset(zone_id, ordinal);
            Pin {
                lon: anchor.0 + dx,
                lat: anchor.1 + dy,
                precision: PinPrecision::Estimated,
            }
        }
    }
}
