//! Loading zones from delimited text and GeoJSON.
//!
//! Column names are mapped once, explicitly, through [`ZoneSchema`]; a missing
//! column is an error rather than a guess.

pub mod coords;
pub mod sample;

pub use coords::parse_coordinate;
pub use sample::{SampleRecord, SampleSchema, join_sample, load_sample};

use crate::projection::{DEFAULT_UTM_ZONE, lon_lat_to_utm};
use crate::zone::{FixedTeam, Position, Zone, ZoneId};
use ahash::{AHashMap, AHashSet};
use geo::{Centroid, Coord, MapCoords};
use geojson::GeoJson;
use serde_json::{Map, Value};
use std::io::Read;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("column '{column}' not found")]
    MissingColumn { column: String },
    #[error("record {record}: '{value}' is not an integer zone id")]
    InvalidId { record: usize, value: String },
    #[error("record {record}: column '{column}' holds unreadable coordinate '{value}'")]
    InvalidCoordinate {
        record: usize,
        column: String,
        value: String,
    },
    #[error("feature {index} has no geometry")]
    MissingGeometry { index: usize },
    #[error("zone {id} has an empty geometry")]
    EmptyGeometry { id: ZoneId },
    #[error("expected a Feature or FeatureCollection")]
    NotFeatureCollection,
}

/// Where zone positions come from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoordinateColumns {
    /// Already metric (e.g. UTM easting/northing).
    Projected { x: String, y: String },
    /// Degrees, reprojected to the given UTM zone on load.
    Geographic { lon: String, lat: String, utm_zone: u8 },
}

impl CoordinateColumns {
    pub fn geographic(lon: &str, lat: &str) -> Self {
        CoordinateColumns::Geographic {
            lon: lon.to_string(),
            lat: lat.to_string(),
            utm_zone: DEFAULT_UTM_ZONE,
        }
    }
}

/// Explicit mapping from source columns to zone fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneSchema {
    pub id_column: String,
    pub coordinates: CoordinateColumns,
    #[serde(default)]
    pub fixed_team_column: Option<String>,
    /// Stored for empty cells and null properties; `None` keeps JSON null.
    #[serde(default)]
    pub missing_attribute: Option<String>,
}

impl Default for ZoneSchema {
    fn default() -> Self {
        Self {
            id_column: "id".to_string(),
            coordinates: CoordinateColumns::Projected {
                x: "x".to_string(),
                y: "y".to_string(),
            },
            fixed_team_column: None,
            missing_attribute: None,
        }
    }
}

/// Column indices after matching a schema against a header row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub id: usize,
    pub first: usize,
    pub second: usize,
    pub fixed_team: Option<usize>,
}

impl ZoneSchema {
    pub fn utm_zone(&self) -> Option<u8> {
        match self.coordinates {
            CoordinateColumns::Projected { .. } => None,
            CoordinateColumns::Geographic { utm_zone, .. } => Some(utm_zone),
        }
    }

    fn coordinate_names(&self) -> (&str, &str) {
        match &self.coordinates {
            CoordinateColumns::Projected { x, y } => (x.as_str(), y.as_str()),
            CoordinateColumns::Geographic { lon, lat, .. } => (lon.as_str(), lat.as_str()),
        }
    }

    /// Matches every mapped column against `headers`, ignoring case and
    /// surrounding whitespace. The first of duplicated headers wins.
    pub fn resolve<'a, I>(&self, headers: I) -> Result<ResolvedColumns, IngestError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let headers: Vec<&str> = headers.into_iter().collect();
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| same_column(h, name))
                .ok_or_else(|| IngestError::MissingColumn {
                    column: name.to_string(),
                })
        };

        let (first, second) = self.coordinate_names();
        Ok(ResolvedColumns {
            id: find(self.id_column.as_str())?,
            first: find(first)?,
            second: find(second)?,
            fixed_team: self.fixed_team_column.as_deref().map(find).transpose()?,
        })
    }

    fn position(&self, first: f64, second: f64) -> Position {
        match self.utm_zone() {
            Some(zone) => lon_lat_to_utm(first, second, zone),
            None => Position::new(first, second),
        }
    }

    fn missing(&self) -> Value {
        self.missing_attribute
            .as_ref()
            .map_or(Value::Null, |s| Value::String(s.clone()))
    }
}

fn same_column(header: &str, name: &str) -> bool {
    header.trim().eq_ignore_ascii_case(name.trim())
}

fn parse_id(raw: &str) -> Option<ZoneId> {
    let raw = raw.trim();
    raw.parse::<ZoneId>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as ZoneId)
    })
}

fn id_from_value(value: Option<&Value>) -> Option<ZoneId> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as ZoneId)
        }),
        Value::String(s) => parse_id(s),
        _ => None,
    }
}

/// Reads one zone per record. Unmapped columns become string attributes.
pub fn load_csv<R: Read>(reader: R, schema: &ZoneSchema) -> Result<Vec<Zone>, IngestError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let cols = schema.resolve(headers.iter())?;
    let (first_name, second_name) = schema.coordinate_names();

    let mut seen = AHashSet::new();
    let attribute_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != cols.id && *i != cols.first && *i != cols.second)
        .filter(|(i, _)| Some(*i) != cols.fixed_team)
        .filter(|(_, h)| seen.insert(h.to_lowercase()))
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut zones = Vec::new();
    for (record_idx, record) in rdr.records().enumerate() {
        let record = record?;
        let cell = |i: usize| record.get(i).unwrap_or("");

        let id = parse_id(cell(cols.id)).ok_or_else(|| IngestError::InvalidId {
            record: record_idx,
            value: cell(cols.id).to_string(),
        })?;

        let coordinate = |i: usize, column: &str| {
            parse_coordinate(cell(i)).ok_or_else(|| IngestError::InvalidCoordinate {
                record: record_idx,
                column: column.to_string(),
                value: cell(i).to_string(),
            })
        };
        let first = coordinate(cols.first, first_name)?;
        let second = coordinate(cols.second, second_name)?;

        let mut attributes = Map::new();
        for (i, name) in &attribute_columns {
            let value = match cell(*i) {
                "" => schema.missing(),
                v => Value::String(v.to_string()),
            };
            attributes.insert(name.clone(), value);
        }

        let fixed_team = cols.fixed_team.map(|i| match cell(i) {
            "" => FixedTeam(Value::Null),
            v => FixedTeam(Value::String(v.to_string())),
        });

        zones.push(Zone {
            id,
            position: schema.position(first, second),
            fixed_team,
            attributes,
        });
    }

    tracing::info!(zones = zones.len(), "loaded zones from CSV");
    Ok(zones)
}

/// Zones loaded from GeoJSON together with their source geometries.
#[derive(Clone, Debug, Default)]
pub struct ZoneLayer {
    pub zones: Vec<Zone>,
    pub geometries: AHashMap<ZoneId, geojson::Geometry>,
}

fn property_key(properties: &Map<String, Value>, name: &str) -> Option<String> {
    properties.keys().find(|k| same_column(k, name)).cloned()
}

/// Reads a Feature or FeatureCollection. Each feature's centroid is its
/// position; the id comes from the `id_column` property. With geographic
/// coordinates the geometry is projected first and the centroid taken in
/// metres. Source geometries are kept unprojected.
pub fn load_geojson(text: &str, schema: &ZoneSchema) -> Result<ZoneLayer, IngestError> {
    let features = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => return Err(IngestError::NotFeatureCollection),
    };

    let mut layer = ZoneLayer::default();
    for (index, feature) in features.into_iter().enumerate() {
        let mut properties = feature.properties.unwrap_or_default();

        let id_key = property_key(&properties, &schema.id_column);
        let id_value = id_key.as_ref().and_then(|k| properties.remove(k));
        let id = id_from_value(id_value.as_ref()).ok_or_else(|| IngestError::InvalidId {
            record: index,
            value: id_value.map(|v| v.to_string()).unwrap_or_default(),
        })?;

        let geometry = feature
            .geometry
            .ok_or(IngestError::MissingGeometry { index })?;
        let shape = geo_types::Geometry::<f64>::try_from(geometry.clone())?;
        let centroid = match schema.utm_zone() {
            Some(zone) => shape
                .map_coords(|c| {
                    let p = lon_lat_to_utm(c.x, c.y, zone);
                    Coord { x: p.x, y: p.y }
                })
                .centroid(),
            None => shape.centroid(),
        }
        .ok_or(IngestError::EmptyGeometry { id })?;

        let fixed_team = schema.fixed_team_column.as_deref().map(|column| {
            let value = property_key(&properties, column)
                .and_then(|k| properties.remove(&k))
                .unwrap_or(Value::Null);
            FixedTeam(value)
        });

        for value in properties.values_mut() {
            if value.is_null() {
                *value = schema.missing();
            }
        }

        layer.zones.push(Zone {
            id,
            position: Position::new(centroid.x(), centroid.y()),
            fixed_team,
            attributes: properties,
        });
        layer.geometries.insert(id, geometry);
    }

    tracing::info!(zones = layer.zones.len(), "loaded zones from GeoJSON");
    Ok(layer)
}
