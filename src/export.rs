use crate::balance::report::LocalityDetail;
use crate::blocks::SelectedBlock;
use crate::mapstyle::team_color;
use crate::projection::utm_to_lon_lat;
use crate::zone::{LabeledZone, ZoneId};
use ahash::{AHashMap, AHashSet};
use geojson::{Feature, FeatureCollection, Geometry, feature::Id};
use serde_json::{Map, Value};
use std::io::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

const PLAN_COLUMNS: [&str; 4] = ["id", "x", "y", "team_id"];

/// Attribute keys in first-seen order across all zones.
fn attribute_keys(zones: &[LabeledZone]) -> Vec<&str> {
    let mut seen = AHashSet::new();
    zones
        .iter()
        .flat_map(|z| z.attributes.keys())
        .map(String::as_str)
        .filter(|k| seen.insert(*k))
        .collect()
}

/// Attributes that collide with a plan column are written as `source_<key>`.
fn attribute_header(key: &str) -> String {
    if PLAN_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(key.trim())) {
        format!("source_{key}")
    } else {
        key.to_string()
    }
}

/// Writes `id,x,y,team_id` followed by every attribute column.
pub fn write_csv<W: Write>(writer: W, zones: &[LabeledZone]) -> Result<(), ExportError> {
    let keys = attribute_keys(zones);
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header: Vec<String> = PLAN_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(keys.iter().map(|k| attribute_header(k)));
    wtr.write_record(&header)?;

    for zone in zones {
        let mut record = vec![
            zone.id.to_string(),
            zone.position.x.to_string(),
            zone.position.y.to_string(),
            zone.team_id.to_string(),
        ];
        record.extend(
            keys.iter()
                .map(|k| zone.attributes.get(*k).map(plain_text).unwrap_or_default()),
        );
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// One feature per zone, using the source geometry when known and otherwise a
/// point at the zone position, unprojected from `utm_zone` to lon/lat.
pub fn to_geojson(
    zones: &[LabeledZone],
    geometries: &AHashMap<ZoneId, Geometry>,
    utm_zone: u8,
) -> FeatureCollection {
    let features = zones
        .iter()
        .map(|zone| {
            let geometry = geometries.get(&zone.id).cloned().unwrap_or_else(|| {
                let (lon, lat) = utm_to_lon_lat(zone.position, utm_zone);
                Geometry::new(geojson::Value::Point(vec![lon, lat]))
            });

            let mut properties: Map<String, Value> = zone.attributes.clone();
            properties.insert("id".to_string(), Value::from(zone.id));
            properties.insert("team_id".to_string(), Value::from(zone.team_id));
            properties.insert("color".to_string(), Value::from(team_color(zone.team_id)));

            Feature {
                bbox: None,
                geometry: Some(geometry),
                id: Some(Id::Number(zone.id.into())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Blocks with the section and team they were selected for.
pub fn blocks_to_geojson(blocks: &[SelectedBlock<'_>]) -> FeatureCollection {
    let features = blocks
        .iter()
        .map(|selected| {
            let mut properties = selected.block.properties.clone();
            properties.insert("section".to_string(), Value::from(selected.section));
            properties.insert("team_id".to_string(), Value::from(selected.team_id));
            properties.insert(
                "color".to_string(),
                Value::from(team_color(selected.team_id)),
            );
            Feature {
                bbox: None,
                geometry: Some(selected.block.geometry.clone()),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Writes `team_id,section,locality,surveys`, one row per detail record.
pub fn write_locality_detail<W: Write>(
    writer: W,
    rows: &[LocalityDetail],
) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["team_id", "section", "locality", "surveys"])?;
    for row in rows {
        wtr.write_record([
            row.team_id.to_string(),
            row.section.to_string(),
            row.locality.clone(),
            row.surveys.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_geojson<W: Write>(writer: W, collection: &FeatureCollection) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(writer, collection)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{CoordinateColumns, ZoneSchema, load_csv};
    use crate::zone::{Position, Zone};
    use serde_json::json;

    fn sample() -> Vec<LabeledZone> {
        vec![
            Zone::new(2701, 1.5, 2.0)
                .with_attribute("localidad", "Zacatlan")
                .with_attribute("meta", 12)
                .labeled(1),
            Zone::new(2702, 3.0, 4.0)
                .with_attribute("localidad", Value::Null)
                .labeled(2),
        ]
    }

    #[test]
    fn csv_has_attribute_columns() {
        let mut out = Vec::new();
        write_csv(&mut out, &sample()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,x,y,team_id,localidad,meta");
        assert_eq!(lines[1], "2701,1.5,2,1,Zacatlan,12");
        assert_eq!(lines[2], "2702,3,4,2,,");
    }

    #[test]
    fn geojson_carries_team_and_colour() {
        let mut geometries = AHashMap::new();
        geometries.insert(
            2702,
            Geometry::new(geojson::Value::Polygon(vec![vec![
                vec![0.0, 0.0],
                vec![1.0, 0.0],
                vec![1.0, 1.0],
                vec![0.0, 0.0],
            ]])),
        );
        let fc = to_geojson(&sample(), &geometries, 14);
        assert_eq!(fc.features.len(), 2);

        let first = &fc.features[0];
        let props = first.properties.as_ref().unwrap();
        assert_eq!(props.get("team_id"), Some(&json!(1)));
        assert_eq!(props.get("color"), Some(&json!("#E74C3C")));
        assert_eq!(props.get("localidad"), Some(&json!("Zacatlan")));
        let (lon, lat) = utm_to_lon_lat(Position::new(1.5, 2.0), 14);
        assert_eq!(
            first.geometry.as_ref().map(|g| g.value.clone()),
            Some(geojson::Value::Point(vec![lon, lat]))
        );
        assert!(matches!(
            fc.features[1].geometry.as_ref().map(|g| &g.value),
            Some(geojson::Value::Polygon(_))
        ));

        let mut out = Vec::new();
        write_geojson(&mut out, &fc).unwrap();
        let parsed: geojson::GeoJson = String::from_utf8(out).unwrap().parse().unwrap();
        assert!(matches!(parsed, geojson::GeoJson::FeatureCollection(_)));
    }

    #[test]
    fn colliding_attribute_names_are_prefixed() {
        let zones = vec![
            Zone::new(1, 0.0, 0.0)
                .with_attribute("team_id", "old")
                .with_attribute("X", 9)
                .labeled(3),
        ];
        let mut out = Vec::new();
        write_csv(&mut out, &zones).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,x,y,team_id,source_X,source_team_id");
        assert_eq!(lines[1], "1,0,0,3,9,old");
    }

    #[test]
    fn geographic_csv_exports_lon_lat_points() {
        let csv = "id,lon,lat\n1,-97.96,19.93\n2,-97.90,19.95\n3,-98.05,19.80\n";
        let schema = ZoneSchema {
            coordinates: CoordinateColumns::geographic("lon", "lat"),
            ..ZoneSchema::default()
        };
        let zones = load_csv(csv.as_bytes(), &schema).unwrap();
        let labeled = crate::assign_teams(zones, 2).unwrap();
        let fc = to_geojson(&labeled, &AHashMap::new(), 14);

        let expected = [(1, -97.96, 19.93), (2, -97.90, 19.95), (3, -98.05, 19.80)];
        for (feature, (id, lon, lat)) in fc.features.iter().zip(expected) {
            assert_eq!(feature.id, Some(Id::Number(id.into())));
            match feature.geometry.as_ref().map(|g| &g.value) {
                Some(geojson::Value::Point(p)) => {
                    assert!((p[0] - lon).abs() < 1e-5, "{p:?}");
                    assert!((p[1] - lat).abs() < 1e-5, "{p:?}");
                }
                other => panic!("expected a point, got {other:?}"),
            }
        }
    }

    #[test]
    fn locality_detail_csv() {
        let rows = vec![
            LocalityDetail {
                team_id: 1,
                section: 2701,
                locality: "Zacatlan".to_string(),
                surveys: 10.0,
            },
            LocalityDetail {
                team_id: 2,
                section: 2703,
                locality: "San Miguel, Centro".to_string(),
                surveys: 2.5,
            },
        ];
        let mut out = Vec::new();
        write_locality_detail(&mut out, &rows).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "team_id,section,locality,surveys\n1,2701,Zacatlan,10\n2,2703,\"San Miguel, Centro\",2.5\n"
        );

        let mut empty = Vec::new();
        write_locality_detail(&mut empty, &[]).unwrap();
        assert_eq!(String::from_utf8(empty).unwrap(), "team_id,section,locality,surveys\n");
    }
}
