use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NUMBER: Regex = Regex::new(r"(\d+(?:\.\d+)?)").unwrap();
}

/// Parses a coordinate written as plain decimal degrees (`-97.96`) or as
/// degrees, minutes and seconds (`19°55'12.5" N`, `97 57 36 W`).
///
/// The value is negative when the text starts with `-` or names the west or
/// south hemisphere. Returns `None` when the text holds no number.
pub fn parse_coordinate(raw: &str) -> Option<f64> {
    let s = raw.trim().to_uppercase();
    if s.is_empty() {
        return None;
    }

    let sign = if s.starts_with('-') || s.contains('W') || s.contains('S') {
        -1.0
    } else {
        1.0
    };

    let parts: Vec<f64> = NUMBER
        .find_iter(&s)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect();

    let magnitude = match parts.as_slice() {
        [] => return None,
        [degrees] => *degrees,
        [degrees, minutes] => degrees + minutes / 60.0,
        [degrees, minutes, seconds, ..] => degrees + minutes / 60.0 + seconds / 3600.0,
    };

    Some(magnitude * sign)
}
