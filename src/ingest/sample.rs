//! Survey sample records and their join onto a zone layer.
//!
//! A sample lists, per locality, the section it falls in and how many
//! surveys it needs. Only sections named in the sample are planned.

use super::{IngestError, ZoneLayer, parse_id, same_column};
use crate::zone::ZoneId;
use ahash::{AHashMap, AHashSet};
use itertools::Itertools;
use serde_json::Value;
use std::io::Read;

/// Attribute holding the comma-joined localities of a section after a join.
pub const LOCALITIES_ATTRIBUTE: &str = "localities";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub section: ZoneId,
    pub locality: String,
    pub surveys: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleSchema {
    pub section_column: String,
    /// Also the attribute name the summed surveys are stored under.
    pub surveys_column: String,
    /// `None` leaves every locality empty.
    #[serde(default)]
    pub locality_column: Option<String>,
}

impl Default for SampleSchema {
    fn default() -> Self {
        Self {
            section_column: "seccion".to_string(),
            surveys_column: "encuestas_totales".to_string(),
            locality_column: Some("localidad".to_string()),
        }
    }
}

fn surveys_value(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Reads one record per row. Unreadable survey counts are zero.
pub fn load_sample<R: Read>(
    reader: R,
    schema: &SampleSchema,
) -> Result<Vec<SampleRecord>, IngestError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| same_column(h, name))
            .ok_or_else(|| IngestError::MissingColumn {
                column: name.to_string(),
            })
    };
    let section_col = find(schema.section_column.as_str())?;
    let surveys_col = find(schema.surveys_column.as_str())?;
    let locality_col = schema.locality_column.as_deref().map(find).transpose()?;

    let mut records = Vec::new();
    for (record_idx, row) in rdr.records().enumerate() {
        let row = row?;
        let cell = |i: usize| row.get(i).unwrap_or("");

        let section = parse_id(cell(section_col)).ok_or_else(|| IngestError::InvalidId {
            record: record_idx,
            value: cell(section_col).to_string(),
        })?;

        records.push(SampleRecord {
            section,
            locality: locality_col.map(|i| cell(i).to_string()).unwrap_or_default(),
            surveys: surveys_value(cell(surveys_col)),
        });
    }

    tracing::info!(records = records.len(), "loaded survey sample");
    Ok(records)
}

/// Keeps the zones (and geometries) whose id appears in `sample`, in layer
/// order. Each kept zone gets its summed surveys under
/// `schema.surveys_column` and its sorted distinct localities under
/// [`LOCALITIES_ATTRIBUTE`].
pub fn join_sample(layer: ZoneLayer, sample: &[SampleRecord], schema: &SampleSchema) -> ZoneLayer {
    let mut per_section: AHashMap<ZoneId, (f64, Vec<&str>)> = AHashMap::new();
    for record in sample {
        let entry = per_section.entry(record.section).or_default();
        entry.0 += record.surveys;
        if !record.locality.is_empty() {
            entry.1.push(record.locality.as_str());
        }
    }

    let before = layer.zones.len();
    let ZoneLayer {
        zones,
        mut geometries,
    } = layer;

    let zones: Vec<_> = zones
        .into_iter()
        .filter_map(|mut zone| {
            let (surveys, localities) = per_section.get(&zone.id)?;
            zone.attributes
                .insert(schema.surveys_column.clone(), Value::from(*surveys));
            zone.attributes.insert(
                LOCALITIES_ATTRIBUTE.to_string(),
                Value::from(localities.iter().sorted().dedup().join(", ")),
            );
            Some(zone)
        })
        .collect();

    let kept: AHashSet<ZoneId> = zones.iter().map(|z| z.id).collect();
    geometries.retain(|id, _| kept.contains(id));

    let unmatched = per_section.keys().filter(|s| !kept.contains(s)).count();
    if unmatched > 0 {
        tracing::warn!(sections = unmatched, "sample sections missing from the zone layer");
    }
    tracing::info!(kept = zones.len(), dropped = before - zones.len(), "joined survey sample");

    ZoneLayer { zones, geometries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::Zone;
    use serde_json::json;

    const SAMPLE_CSV: &str = "\
Seccion,Localidad,Encuestas_Totales
2701,Zacatlan,10
2703,Jicolapa,4
2701,Tepetzintla,n/d
2701,Zacatlan,3
";

    #[test]
    fn loads_sample_rows() {
        let records = load_sample(SAMPLE_CSV.as_bytes(), &SampleSchema::default()).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(
            records[0],
            SampleRecord {
                section: 2701,
                locality: "Zacatlan".to_string(),
                surveys: 10.0
            }
        );
        assert_eq!(records[2].surveys, 0.0);
    }

    #[test]
    fn missing_sample_column_is_reported() {
        let schema = SampleSchema {
            surveys_column: "meta".to_string(),
            ..SampleSchema::default()
        };
        assert!(matches!(
            load_sample(SAMPLE_CSV.as_bytes(), &schema),
            Err(IngestError::MissingColumn { column }) if column == "meta"
        ));
    }

    #[test]
    fn join_keeps_sampled_sections_only() {
        let mut layer = ZoneLayer {
            zones: vec![
                Zone::new(2701, 0.0, 0.0),
                Zone::new(2702, 1.0, 0.0),
                Zone::new(2703, 2.0, 0.0),
            ],
            ..ZoneLayer::default()
        };
        layer.geometries.insert(
            2702,
            geojson::Geometry::new(geojson::Value::Point(vec![1.0, 0.0])),
        );

        let schema = SampleSchema::default();
        let records = load_sample(SAMPLE_CSV.as_bytes(), &schema).unwrap();
        let joined = join_sample(layer, &records, &schema);

        let ids: Vec<ZoneId> = joined.zones.iter().map(|z| z.id).collect();
        assert_eq!(ids, vec![2701, 2703]);
        assert!(joined.geometries.is_empty());

        let first = &joined.zones[0].attributes;
        assert_eq!(first.get("encuestas_totales"), Some(&json!(13.0)));
        assert_eq!(
            first.get(LOCALITIES_ATTRIBUTE),
            Some(&json!("Tepetzintla, Zacatlan"))
        );
        assert_eq!(
            joined.zones[1].attributes.get("encuestas_totales"),
            Some(&json!(4.0))
        );
    }
}
