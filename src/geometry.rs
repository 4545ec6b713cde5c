use crate::config::CountiesConfig;
use crate::error::LoadError;
use crate::source::Source;
use crate::types::{BoundaryOverlay, CountyFeature, GeometryCollection};
use geo::{Coord, LineString, MultiPolygon};
use geojson::GeoJson;
use std::path::Path;
use tracing::{debug, info};

pub fn load_counties(config: &CountiesConfig) -> Result<GeometryCollection, LoadError> {
    let source = Source::parse(&config.source);
    let bytes = source.fetch(config.accept_invalid_certs)?;
    let collection = parse_counties(&bytes, config, source.location())?;
    info!(
        "Kept {} county geometries with {}={}",
        collection.features.len(),
        config.state_property,
        config.state_code
    );
    Ok(collection)
}

/// Keeps only the polygon features of the configured state, named by `name_property`.
pub fn parse_counties(bytes: &[u8], config: &CountiesConfig, location: &str) -> Result<GeometryCollection, LoadError> {
    let geojson = GeoJson::from_reader(bytes).map_err(|e| LoadError::malformed(location, e))?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(LoadError::schema(location, "expected a FeatureCollection")),
    };

    let mut features = Vec::new();

    for feature in collection.features {
        let props = match feature.properties.as_ref() {
            Some(p) => p,
            None => continue,
        };

        if property_string(props.get(&config.state_property)).as_deref() != Some(config.state_code.as_str()) {
            continue;
        }

        let name = match property_string(props.get(&config.name_property)) {
            Some(n) => n,
            None => {
                debug!("Skipping county feature without '{}'", config.name_property);
                continue;
            }
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let geo_geom: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| LoadError::malformed(location, format!("{:?}", e)))?;

                match geo_geom {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue,
                }
            }
            None => continue,
        };

        features.push(CountyFeature { name, geometry });
    }

    Ok(GeometryCollection {
        join_property: config.name_property.clone(),
        features,
    })
}

fn property_string(value: Option<&serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Loads region outlines from a local GeoJSON or shapefile.
pub fn load_boundaries(path: &Path) -> Result<BoundaryOverlay, LoadError> {
    let location = path.to_string_lossy().into_owned();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .ok_or_else(|| LoadError::schema(location.as_str(), "boundary file has no extension"))?;

    let overlay = match extension.as_str() {
        "shp" => load_shapefile_boundaries(path, &location)?,
        "json" | "geojson" => {
            let bytes = std::fs::read(path).map_err(|e| LoadError::unreachable(location.as_str(), e))?;
            parse_geojson_boundaries(&bytes, &location)?
        }
        _ => return Err(LoadError::schema(location, format!("unsupported boundary format: {}", extension))),
    };

    info!("Loaded {} boundary lines from {}", overlay.lines.len(), location);
    Ok(overlay)
}

pub fn parse_geojson_boundaries(bytes: &[u8], location: &str) -> Result<BoundaryOverlay, LoadError> {
    let geojson = GeoJson::from_reader(bytes).map_err(|e| LoadError::malformed(location, e))?;
    let geometries: Vec<geojson::Geometry> = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features.into_iter().filter_map(|f| f.geometry).collect(),
        GeoJson::Feature(f) => f.geometry.into_iter().collect(),
        GeoJson::Geometry(g) => vec![g],
    };

    let mut lines = Vec::new();
    for geom in geometries {
        let geo_geom: geo::Geometry<f64> = geom
            .value
            .try_into()
            .map_err(|e| LoadError::malformed(location, format!("{:?}", e)))?;
        collect_lines(geo_geom, &mut lines);
    }

    Ok(BoundaryOverlay { lines })
}

fn collect_lines(geom: geo::Geometry<f64>, lines: &mut Vec<LineString<f64>>) {
    match geom {
        geo::Geometry::LineString(ls) => lines.push(ls),
        geo::Geometry::MultiLineString(mls) => lines.extend(mls),
        geo::Geometry::Polygon(p) => {
            let (exterior, interiors) = p.into_inner();
            lines.push(exterior);
            lines.extend(interiors);
        }
        geo::Geometry::MultiPolygon(mp) => {
            for p in mp {
                collect_lines(geo::Geometry::Polygon(p), lines);
            }
        }
        geo::Geometry::GeometryCollection(gc) => {
            for g in gc {
                collect_lines(g, lines);
            }
        }
        _ => {}
    }
}

fn load_shapefile_boundaries(path: &Path, location: &str) -> Result<BoundaryOverlay, LoadError> {
    let shapes = shapefile::read_shapes(path).map_err(|e| LoadError::malformed(location, e))?;

    let mut lines = Vec::new();
    for shape in shapes {
        match shape {
            shapefile::Shape::Polyline(pl) => {
                lines.extend(pl.parts().iter().map(|part| to_line(part.iter().map(|p| (p.x, p.y)))));
            }
            shapefile::Shape::PolylineM(pl) => {
                lines.extend(pl.parts().iter().map(|part| to_line(part.iter().map(|p| (p.x, p.y)))));
            }
            shapefile::Shape::PolylineZ(pl) => {
                lines.extend(pl.parts().iter().map(|part| to_line(part.iter().map(|p| (p.x, p.y)))));
            }
            shapefile::Shape::Polygon(pg) => {
                lines.extend(pg.rings().iter().map(|ring| to_line(ring.points().iter().map(|p| (p.x, p.y)))));
            }
            shapefile::Shape::PolygonM(pg) => {
                lines.extend(pg.rings().iter().map(|ring| to_line(ring.points().iter().map(|p| (p.x, p.y)))));
            }
            shapefile::Shape::PolygonZ(pg) => {
                lines.extend(pg.rings().iter().map(|ring| to_line(ring.points().iter().map(|p| (p.x, p.y)))));
            }
            _ => continue,
        }
    }

    Ok(BoundaryOverlay { lines })
}

fn to_line(points: impl Iterator<Item = (f64, f64)>) -> LineString<f64> {
    LineString::new(points.map(|(x, y)| Coord { x, y }).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counties_config() -> CountiesConfig {
        CountiesConfig {
            source: "test".into(),
            state_property: "STATE".into(),
            state_code: "48".into(),
            name_property: "NAME".into(),
            accept_invalid_certs: false,
        }
    }

    fn square(x: f64, y: f64) -> String {
        format!(
            "[[[{x},{y}],[{x1},{y}],[{x1},{y1}],[{x},{y1}],[{x},{y}]]]",
            x = x,
            y = y,
            x1 = x + 1.0,
            y1 = y + 1.0
        )
    }

    fn counties_json() -> String {
        format!(
            r#"{{
                "type": "FeatureCollection",
                "features": [
                    {{"type": "Feature", "id": "48201",
                      "properties": {{"STATE": "48", "NAME": "Harris"}},
                      "geometry": {{"type": "Polygon", "coordinates": {a}}}}},
                    {{"type": "Feature", "id": "40001",
                      "properties": {{"STATE": "40", "NAME": "Adair"}},
                      "geometry": {{"type": "Polygon", "coordinates": {b}}}}},
                    {{"type": "Feature", "id": "48453",
                      "properties": {{"STATE": "48", "NAME": "Travis"}},
                      "geometry": {{"type": "MultiPolygon", "coordinates": [{c}]}}}},
                    {{"type": "Feature", "id": "48999",
                      "properties": {{"STATE": "48", "NAME": "Dot"}},
                      "geometry": {{"type": "Point", "coordinates": [0.0, 0.0]}}}}
                ]
            }}"#,
            a = square(-95.5, 29.5),
            b = square(-94.8, 35.7),
            c = square(-98.0, 30.0)
        )
    }

    #[test]
    fn keeps_only_target_state_polygons() {
        let collection = parse_counties(counties_json().as_bytes(), &counties_config(), "counties").unwrap();
        let names: Vec<&str> = collection.features.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Harris", "Travis"]);
        assert_eq!(collection.join_property, "NAME");
    }

    #[test]
    fn numeric_state_codes_are_compared_as_text() {
        let json = format!(
            r#"{{"type": "FeatureCollection", "features": [
                {{"type": "Feature", "properties": {{"STATE": 48, "NAME": "Harris"}},
                  "geometry": {{"type": "Polygon", "coordinates": {}}}}}]}}"#,
            square(0.0, 0.0)
        );
        let collection = parse_counties(json.as_bytes(), &counties_config(), "counties").unwrap();
        assert_eq!(collection.features.len(), 1);
    }

    #[test]
    fn malformed_counties_json_is_load_error() {
        assert!(matches!(
            parse_counties(b"{\"type\":", &counties_config(), "counties"),
            Err(LoadError::Malformed { .. })
        ));
    }

    #[test]
    fn boundary_geojson_collects_lines_and_rings() {
        let json = format!(
            r#"{{"type": "FeatureCollection", "features": [
                {{"type": "Feature", "properties": {{}},
                  "geometry": {{"type": "LineString", "coordinates": [[0,0],[1,1]]}}}},
                {{"type": "Feature", "properties": {{}},
                  "geometry": {{"type": "MultiLineString", "coordinates": [[[0,0],[1,0]],[[1,0],[1,1]]]}}}},
                {{"type": "Feature", "properties": {{}},
                  "geometry": {{"type": "Polygon", "coordinates": {}}}}}
            ]}}"#,
            square(0.0, 0.0)
        );
        let overlay = parse_geojson_boundaries(json.as_bytes(), "regions").unwrap();
        assert_eq!(overlay.lines.len(), 4);
        assert_eq!(overlay.lines[3].0.len(), 5);
    }

    #[test]
    fn boundary_file_extension_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.kml");
        std::fs::write(&path, "<kml/>").unwrap();
        assert!(matches!(load_boundaries(&path), Err(LoadError::Schema { .. })));

        let path = dir.path().join("regions.geojson");
        std::fs::write(
            &path,
            r#"{"type": "LineString", "coordinates": [[-100.0, 30.0], [-99.0, 31.0]]}"#,
        )
        .unwrap();
        assert_eq!(load_boundaries(&path).unwrap().lines.len(), 1);
    }
}
