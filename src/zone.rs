//! Zone records exchanged between loaders, the balancing engine and exporters.

use serde_json::{Map, Value};

/// External identifier of a zone, e.g. an electoral section code.
pub type ZoneId = i64;

/// Team (brigade) number. Assigned teams are 1-indexed; 0 is the sentinel for
/// an unusable fixed assignment.
pub type TeamId = u32;

pub const UNASSIGNED_TEAM: TeamId = 0;

/// Planar position in a metric coordinate reference (metres).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        self.distance_sq(other).sqrt()
    }

    pub fn distance_sq(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Position {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Raw value of a pre-assigned team column, kept as loaded so the cast to a
/// team id happens in one place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixedTeam(pub Value);

impl FixedTeam {
    /// Integer team id, or [`UNASSIGNED_TEAM`] for missing, negative, fractional
    /// overflow or non-numeric values. Fractions truncate toward zero.
    pub fn team_id(&self) -> TeamId {
        match &self.0 {
            Value::Number(n) => {
                if let Some(i) = n.as_u64() {
                    TeamId::try_from(i).unwrap_or(UNASSIGNED_TEAM)
                } else {
                    n.as_f64().map(float_to_team).unwrap_or(UNASSIGNED_TEAM)
                }
            }
            Value::String(s) => {
                let s = s.trim();
                match s.parse::<TeamId>() {
                    Ok(id) => id,
                    Err(_) => s
                        .parse::<f64>()
                        .map(float_to_team)
                        .unwrap_or(UNASSIGNED_TEAM),
                }
            }
            Value::Bool(b) => TeamId::from(*b),
            _ => UNASSIGNED_TEAM,
        }
    }
}

fn float_to_team(f: f64) -> TeamId {
    if f.is_finite() && f >= 0.0 && f <= TeamId::MAX as f64 {
        f.trunc() as TeamId
    } else {
        UNASSIGNED_TEAM
    }
}

/// A zone as handed to the engine. `attributes` is carried through untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_team: Option<FixedTeam>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Zone {
    pub fn new(id: ZoneId, x: f64, y: f64) -> Self {
        Self {
            id,
            position: Position::new(x, y),
            fixed_team: None,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_fixed_team(mut self, value: impl Into<Value>) -> Self {
        self.fixed_team = Some(FixedTeam(value.into()));
        self
    }

    pub fn labeled(self, team_id: TeamId) -> LabeledZone {
        LabeledZone {
            id: self.id,
            position: self.position,
            attributes: self.attributes,
            team_id,
        }
    }
}

/// Engine output: the input zone plus its team.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabeledZone {
    pub id: ZoneId,
    pub position: Position,
    pub attributes: Map<String, Value>,
    pub team_id: TeamId,
}
