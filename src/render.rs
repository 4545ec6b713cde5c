use crate::config::MapConfig;
use crate::error::RenderError;
use crate::palette::{Color, ColorScale};
use crate::types::{BoundaryOverlay, CountyRecord, GeometryCollection};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

const DEFAULT_BACKGROUND: Color = Color::rgb(255, 255, 255);
const DEFAULT_BOUNDARY: Color = Color::rgb(0, 0, 128);

pub struct RenderOptions<'a> {
    /// Catalog name, optionally suffixed with `_r`.
    pub color_scale: &'a str,
    pub reversed: bool,
    pub boundaries: Option<&'a BoundaryOverlay>,
    pub map: &'a MapConfig,
}

/// A renderable choropleth: everything needed to draw the map, and nothing that depends on
/// previous renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub title: String,
    pub traces: Vec<ChoroplethTrace>,
    pub layers: Vec<MapLayer>,
    pub color_axis: ColorAxis,
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoroplethTrace {
    pub value_column: String,
    pub feature_id_key: String,
    /// One entry per geometry feature, in geometry order.
    pub fills: Vec<FeatureFill>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureFill {
    pub location: String,
    pub value: Option<f64>,
    pub color: Option<Color>,
}

impl FeatureFill {
    pub fn is_matched(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MapLayer {
    /// Basemap tiles drawn below the choropleth trace.
    Raster {
        source: String,
        attribution: Option<String>,
    },
    /// Boundary overlay drawn above the choropleth trace.
    Line {
        color: Color,
        width: u32,
        line_count: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorAxis {
    pub min: f64,
    pub max: f64,
    pub scale: String,
    pub reversed: bool,
    pub stops: Vec<(f64, Color)>,
}

impl ColorAxis {
    pub fn domain(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// Position of `value` within the domain. A zero-width domain maps to the midpoint.
    pub fn normalize(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span > 0.0 {
            (value - self.min) / span
        } else {
            0.5
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: f64,
    pub width: u32,
    pub height: u32,
    pub opacity: f64,
    pub background: Color,
}

/// Renders `value_column` of `rows` onto `geometry`.
///
/// The color domain is the min/max over exactly `rows`, so a filtered subset gets its own domain.
/// Features with no matching row (or a row without a value) are left unfilled.
pub fn render(
    rows: &[&CountyRecord],
    geometry: &GeometryCollection,
    value_column: &str,
    options: &RenderOptions,
) -> Result<Figure, RenderError> {
    let scale = ColorScale::lookup(options.color_scale, options.reversed)
        .ok_or_else(|| RenderError::UnknownColorScale(options.color_scale.to_string()))?;

    let values: HashMap<&str, f64> = rows
        .iter()
        .filter_map(|r| r.value(value_column).map(|v| (r.county.as_str(), v)))
        .collect();

    let (min, max) = values
        .values()
        .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .ok_or_else(|| RenderError::EmptyColumn(value_column.to_string()))?;

    let color_axis = ColorAxis {
        min,
        max,
        scale: scale.name.to_string(),
        reversed: scale.reversed,
        stops: scale.stops(),
    };

    let fills: Vec<FeatureFill> = geometry
        .features
        .iter()
        .map(|feature| {
            let value = values.get(feature.name.as_str()).copied();
            FeatureFill {
                location: feature.name.clone(),
                value,
                color: value.map(|v| scale.at(color_axis.normalize(v))),
            }
        })
        .collect();

    let matched = fills.iter().filter(|f| f.is_matched()).count();
    debug!(
        "Rendered {}: {} of {} features matched, {} rows without geometry",
        value_column,
        matched,
        fills.len(),
        values.len().saturating_sub(matched)
    );

    let map = options.map;
    let mut layers = Vec::new();
    if let Some(tiles) = &map.basemap_tiles {
        layers.push(MapLayer::Raster {
            source: tiles.clone(),
            attribution: map.basemap_attribution.clone(),
        });
    }
    if let Some(overlay) = options.boundaries {
        layers.push(MapLayer::Line {
            color: Color::from_hex(&map.boundary_color).unwrap_or(DEFAULT_BOUNDARY),
            width: map.boundary_width,
            line_count: overlay.lines.len(),
        });
    }

    Ok(Figure {
        title: format!("Map for {}", value_column),
        traces: vec![ChoroplethTrace {
            value_column: value_column.to_string(),
            feature_id_key: format!("properties.{}", geometry.join_property),
            fills,
        }],
        layers,
        color_axis,
        layout: Layout {
            center_lat: map.center_lat,
            center_lon: map.center_lon,
            zoom: map.zoom,
            width: map.width,
            height: map.height,
            opacity: map.opacity.clamp(0.0, 1.0),
            background: Color::from_hex(&map.background).unwrap_or(DEFAULT_BACKGROUND),
        },
    })
}
