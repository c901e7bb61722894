// ===========================================================================
// WGS84 <-> UTM (transverse Mercator) for metric zone positions
// ===========================================================================
use crate::zone::Position;

pub const WGS84_A: f64 = 6378137.0;
pub const WGS84_F: f64 = 1.0 / 298.257223563;
pub const UTM_SCALE: f64 = 0.9996;
pub const FALSE_EASTING: f64 = 500_000.0;
pub const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Zone 14N (EPSG:32614), covering central Mexico.
pub const DEFAULT_UTM_ZONE: u8 = 14;

/// UTM zone (1..=60) containing a longitude.
pub fn utm_zone_for(lon: f64) -> u8 {
    let zone = ((lon + 180.0) / 6.0).floor() as i64 + 1;
    zone.clamp(1, 60) as u8
}

pub fn central_meridian(zone: u8) -> f64 {
    (zone.clamp(1, 60) as f64 - 1.0) * 6.0 - 180.0 + 3.0
}

/// Project lon/lat degrees (EPSG:4326) to UTM easting/northing in metres.
/// Southern-hemisphere latitudes use the 10 000 km false northing.
pub fn lon_lat_to_utm(lon: f64, lat: f64, zone: u8) -> Position {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let ep2 = e2 / (1.0 - e2);

    let phi = lat.to_radians();
    let (sin_phi, cos_phi) = phi.sin_cos();
    let tan_phi = phi.tan();

    let n = WGS84_A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = ep2 * cos_phi * cos_phi;
    let a = cos_phi * (lon - central_meridian(zone)).to_radians();

    let m = WGS84_A
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin());

    let x = UTM_SCALE
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + FALSE_EASTING;

    let mut y = UTM_SCALE
        * (m + n
            * tan_phi
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));

    if lat < 0.0 {
        y += FALSE_NORTHING_SOUTH;
    }

    Position::new(x, y)
}

/// Inverse of [`lon_lat_to_utm`] for northern-hemisphere zones (EPSG:326xx).
/// Returns `(lon, lat)` in degrees.
pub fn utm_to_lon_lat(position: Position, zone: u8) -> (f64, f64) {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let ep2 = e2 / (1.0 - e2);
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let x = position.x - FALSE_EASTING;
    let m = position.y / UTM_SCALE;
    let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    // footpoint latitude
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let (sin_phi1, cos_phi1) = phi1.sin_cos();
    let tan_phi1 = phi1.tan();
    let w = 1.0 - e2 * sin_phi1 * sin_phi1;
    let n1 = WGS84_A / w.sqrt();
    let r1 = WGS84_A * (1.0 - e2) / w.powf(1.5);
    let t1 = tan_phi1 * tan_phi1;
    let c1 = ep2 * cos_phi1 * cos_phi1;
    let d = x / (n1 * UTM_SCALE);

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);

    let lon = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d.powi(5)
            / 120.0)
        / cos_phi1;

    (central_meridian(zone) + lon.to_degrees(), lat.to_degrees())
}
