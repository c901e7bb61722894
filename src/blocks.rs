//! City blocks (manzanas) drawn under the planned sections.

use crate::ingest::IngestError;
use crate::zone::{LabeledZone, TeamId, ZoneId};
use ahash::AHashMap;
use geo::{BoundingRect, Intersects, Rect};
use geojson::GeoJson;
use serde_json::{Map, Value};

#[derive(Clone, Debug)]
pub struct Block {
    pub properties: Map<String, Value>,
    /// As read, for export.
    pub geometry: geojson::Geometry,
    shape: geo_types::Geometry<f64>,
    bbox: Option<Rect<f64>>,
}

/// A block touching a planned section, labelled with the first such section
/// in plan order.
#[derive(Clone, Debug)]
pub struct SelectedBlock<'a> {
    pub block: &'a Block,
    pub section: ZoneId,
    pub team_id: TeamId,
}

impl Block {
    pub fn new(
        properties: Map<String, Value>,
        geometry: geojson::Geometry,
    ) -> Result<Self, IngestError> {
        let shape = geo_types::Geometry::<f64>::try_from(geometry.clone())?;
        let bbox = shape.bounding_rect();
        Ok(Self {
            properties,
            geometry,
            shape,
            bbox,
        })
    }
}

pub fn load_blocks(text: &str) -> Result<Vec<Block>, IngestError> {
    let features = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => return Err(IngestError::NotFeatureCollection),
    };

    let blocks = features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| {
            let geometry = feature
                .geometry
                .ok_or(IngestError::MissingGeometry { index })?;
            Block::new(feature.properties.unwrap_or_default(), geometry)
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(blocks = blocks.len(), "loaded blocks");
    Ok(blocks)
}

/// Blocks intersecting the geometry of any zone in `zones`. Zones without a
/// source geometry select nothing.
pub fn select_blocks<'a>(
    blocks: &'a [Block],
    zones: &[LabeledZone],
    geometries: &AHashMap<ZoneId, geojson::Geometry>,
) -> Result<Vec<SelectedBlock<'a>>, IngestError> {
    let mut sections = Vec::with_capacity(zones.len());
    for zone in zones {
        let Some(geometry) = geometries.get(&zone.id) else {
            continue;
        };
        let shape = geo_types::Geometry::<f64>::try_from(geometry.clone())?;
        let bbox = shape.bounding_rect();
        sections.push((zone, shape, bbox));
    }
    if sections.len() < zones.len() {
        tracing::warn!(
            without_geometry = zones.len() - sections.len(),
            "zones without geometry cannot select blocks"
        );
    }

    let selected: Vec<SelectedBlock<'a>> = blocks
        .iter()
        .filter_map(|block| {
            sections
                .iter()
                .find(|(_, shape, bbox)| {
                    let near = match (bbox, &block.bbox) {
                        (Some(a), Some(b)) => a.intersects(b),
                        _ => false,
                    };
                    near && shape.intersects(&block.shape)
                })
                .map(|(zone, _, _)| SelectedBlock {
                    block,
                    section: zone.id,
                    team_id: zone.team_id,
                })
        })
        .collect();

    tracing::debug!(selected = selected.len(), total = blocks.len(), "selected blocks");
    Ok(selected)
}
