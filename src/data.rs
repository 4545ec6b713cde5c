use crate::basemap;
use crate::config::{InputConfig, MapConfig, RegionLookupConfig, TableFormat, TableSourceConfig};
use crate::error::LoadError;
use crate::geometry;
use crate::source::Source;
use crate::types::{CountyRecord, CountyTable, GeometryCollection, ReferenceData, RegionId};
use csv::{ReaderBuilder, Trim};
use geojson::GeoJson;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// County name -> region id, used once to enrich the disaster table.
#[derive(Debug, Clone, Default)]
pub struct RegionLookup(pub HashMap<String, Option<RegionId>>);

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

/// Rows as read from a source, before any typing.
#[derive(Debug, Default)]
struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

pub fn load_table(input: &InputConfig) -> Result<CountyTable, LoadError> {
    let mut table = load_disasters(&input.disasters)?;
    info!(
        "Loaded {} counties with statistics {:?}",
        table.records.len(),
        table.statistic_columns
    );

    if let Some(lookup_config) = &input.region_lookup {
        let lookup = load_region_lookup(lookup_config)?;
        info!("Loaded region lookup for {} counties", lookup.0.len());
        join_regions(&mut table, &lookup);
    }

    Ok(table)
}

fn load_disasters(config: &TableSourceConfig) -> Result<CountyTable, LoadError> {
    let source = Source::parse(&config.source);
    let bytes = source.fetch(config.accept_invalid_certs)?;

    let format = config.format.unwrap_or_else(|| match source.extension().as_deref() {
        Some("csv") | Some("txt") | Some("tsv") => TableFormat::Csv,
        _ => TableFormat::Geojson,
    });

    let raw = match format {
        TableFormat::Csv => read_csv(&bytes, source.location())?,
        TableFormat::Geojson => read_feature_properties(&bytes, source.location())?,
    };

    build_table(raw, config, source.location())
}

/// Headers are trimmed; cells are kept as written so county names match GeoJSON sources exactly.
fn read_csv(bytes: &[u8], location: &str) -> Result<RawTable, LoadError> {
    let mut rdr = ReaderBuilder::new().trim(Trim::Headers).from_reader(bytes);
    let columns: Vec<String> = rdr
        .headers()
        .map_err(|e| LoadError::malformed(location, e))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| LoadError::malformed(location, e))?;
        let row = record
            .iter()
            .map(|field| {
                if field.trim().is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(field.to_string())
                }
            })
            .collect();
        rows.push(row);
    }

    Ok(RawTable { columns, rows })
}

/// Reads a FeatureCollection whose feature properties are the table rows (WFS output).
fn read_feature_properties(bytes: &[u8], location: &str) -> Result<RawTable, LoadError> {
    let geojson = GeoJson::from_reader(bytes).map_err(|e| LoadError::malformed(location, e))?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(LoadError::schema(location, "expected a FeatureCollection")),
    };

    // Column order follows first appearance across features.
    let mut columns: Vec<String> = Vec::new();
    for feature in &collection.features {
        if let Some(props) = &feature.properties {
            for key in props.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let rows = collection
        .features
        .iter()
        .map(|feature| {
            columns
                .iter()
                .map(|col| {
                    match feature.properties.as_ref().and_then(|p| p.get(col)) {
                        None | Some(serde_json::Value::Null) => Cell::Empty,
                        Some(serde_json::Value::Number(n)) => {
                            n.as_f64().map(Cell::Number).unwrap_or(Cell::Empty)
                        }
                        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Cell::Empty,
                        Some(serde_json::Value::String(s)) => Cell::Text(s.clone()),
                        Some(other) => Cell::Text(other.to_string()),
                    }
                })
                .collect()
        })
        .collect();

    Ok(RawTable { columns, rows })
}

fn build_table(raw: RawTable, config: &TableSourceConfig, location: &str) -> Result<CountyTable, LoadError> {
    let join_idx = raw
        .columns
        .iter()
        .position(|c| *c == config.join_column)
        .ok_or_else(|| LoadError::schema(location, format!("join column '{}' not found", config.join_column)))?;

    let region_idx = match &config.region_column {
        Some(name) => Some(
            raw.columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| LoadError::schema(location, format!("region column '{}' not found", name)))?,
        ),
        None => None,
    };

    let statistic_columns: Vec<String> = match &config.statistic_columns {
        Some(explicit) => {
            if let Some(missing) = explicit.iter().find(|c| !raw.columns.contains(c)) {
                return Err(LoadError::schema(location, format!("statistic column '{}' not found", missing)));
            }
            explicit.clone()
        }
        None => raw
            .columns
            .iter()
            .enumerate()
            .skip(config.reserved_columns)
            .filter(|(i, _)| *i != join_idx && Some(*i) != region_idx)
            .map(|(_, c)| c.clone())
            .collect(),
    };

    if statistic_columns.is_empty() {
        return Err(LoadError::schema(location, "no statistic columns"));
    }

    let stat_indices: Vec<(usize, &String)> = statistic_columns
        .iter()
        .map(|name| (raw.columns.iter().position(|c| c == name).unwrap_or(usize::MAX), name))
        .collect();

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(raw.rows.len());

    for (row_no, row) in raw.rows.iter().enumerate() {
        let county = match row.get(join_idx) {
            Some(Cell::Text(s)) => s.clone(),
            Some(Cell::Number(n)) => n.to_string(),
            _ => continue,
        };

        if !seen.insert(county.clone()) {
            return Err(LoadError::DuplicateKey { source: location.to_string(), key: county });
        }

        let mut stats = HashMap::new();
        for (idx, name) in &stat_indices {
            let value = match row.get(*idx) {
                None | Some(Cell::Empty) => None,
                Some(Cell::Number(n)) => Some(*n),
                Some(Cell::Text(s)) => Some(s.trim().parse::<f64>().map_err(|_| {
                    LoadError::schema(
                        location,
                        format!("row {}: column '{}' is not numeric: '{}'", row_no + 1, name, s),
                    )
                })?),
            };
            if let Some(v) = value.filter(|v| v.is_finite()) {
                stats.insert((*name).clone(), v);
            }
        }

        let region_text = match region_idx.and_then(|idx| row.get(idx)) {
            Some(Cell::Number(n)) => Some(n.to_string()),
            Some(Cell::Text(s)) => Some(s.clone()),
            _ => None,
        };
        let region = region_text
            .map(|text| {
                parse_region(&text).ok_or_else(|| {
                    LoadError::schema(location, format!("row {}: invalid region '{}'", row_no + 1, text))
                })
            })
            .transpose()?;

        records.push(CountyRecord { county, stats, region });
    }

    Ok(CountyTable { statistic_columns, records })
}

pub fn load_region_lookup(config: &RegionLookupConfig) -> Result<RegionLookup, LoadError> {
    let source = Source::parse(&config.source);
    let bytes = source.fetch(config.accept_invalid_certs)?;
    parse_region_lookup(&bytes, config, source.location())
}

fn parse_region_lookup(bytes: &[u8], config: &RegionLookupConfig, location: &str) -> Result<RegionLookup, LoadError> {
    let raw = read_csv(bytes, location)?;

    let find = |name: &str| {
        raw.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| LoadError::schema(location, format!("column '{}' not found", name)))
    };
    let county_idx = find(&config.county_column)?;
    let region_idx = find(&config.region_column)?;

    let mut lookup = HashMap::new();
    for row in &raw.rows {
        let county = match row.get(county_idx) {
            Some(Cell::Text(s)) => s.clone(),
            _ => continue,
        };
        let region = match row.get(region_idx) {
            Some(Cell::Text(s)) => Some(parse_region(s).ok_or_else(|| {
                LoadError::schema(location, format!("invalid region '{}' for {}", s, county))
            })?),
            _ => None,
        };
        if lookup.insert(county.clone(), region).is_some() {
            return Err(LoadError::DuplicateKey { source: location.to_string(), key: county });
        }
    }

    Ok(RegionLookup(lookup))
}

/// Accepts `2` as well as `2.0` (spreadsheet exports).
fn parse_region(s: &str) -> Option<RegionId> {
    let s = s.trim();
    if let Ok(id) = s.parse::<u8>() {
        return (id > 0).then_some(RegionId(id));
    }
    let f = s.parse::<f64>().ok()?;
    if f.fract() == 0.0 && f >= 1.0 && f <= u8::MAX as f64 {
        Some(RegionId(f as u8))
    } else {
        None
    }
}

/// Left join: every county keeps its row, unmatched ones stay unassigned.
/// Replaces any region read from the table's own region column.
pub fn join_regions(table: &mut CountyTable, lookup: &RegionLookup) {
    let mut unmatched = 0;
    for record in &mut table.records {
        match lookup.0.get(&record.county) {
            Some(region) => record.region = *region,
            None => {
                debug!("No region for county {}", record.county);
                record.region = None;
                unmatched += 1;
            }
        }
    }
    if unmatched > 0 {
        info!("{} counties have no region assignment", unmatched);
    }
}

/// Loads every startup dataset, basemap tiles included. Any failure aborts startup.
pub fn load_reference_data(input: &InputConfig, map: &MapConfig) -> Result<ReferenceData, LoadError> {
    let table = load_table(input)?;
    let geometry = geometry::load_counties(&input.counties)?;
    let boundaries = input
        .boundaries
        .as_deref()
        .map(geometry::load_boundaries)
        .transpose()?;

    let report = JoinReport::new(&table, &geometry);
    if report.unmatched_rows.is_empty() {
        info!("All {} counties matched a geometry", report.rows);
    } else {
        info!(
            "{} of {} counties have no geometry and will not be drawn",
            report.unmatched_rows.len(),
            report.rows
        );
    }

    let basemap = basemap::load_basemap(map)?;

    Ok(ReferenceData { table, geometry, boundaries, basemap })
}

/// How the table and the county geometries line up. Mismatches are never fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinReport {
    pub rows: usize,
    pub features: usize,
    pub matched: usize,
    pub unmatched_rows: Vec<String>,
    pub unmatched_features: Vec<String>,
    pub regions: BTreeMap<Option<RegionId>, usize>,
}

impl JoinReport {
    pub fn new(table: &CountyTable, geometry: &GeometryCollection) -> Self {
        let names: HashSet<&str> = geometry.features.iter().map(|f| f.name.as_str()).collect();
        let counties: HashSet<&str> = table.records.iter().map(|r| r.county.as_str()).collect();

        let unmatched_rows: Vec<String> = table
            .records
            .iter()
            .filter(|r| !names.contains(r.county.as_str()))
            .map(|r| r.county.clone())
            .collect();
        let unmatched_features: Vec<String> = geometry
            .features
            .iter()
            .filter(|f| !counties.contains(f.name.as_str()))
            .map(|f| f.name.clone())
            .collect();

        let mut regions = BTreeMap::new();
        for record in &table.records {
            *regions.entry(record.region).or_insert(0) += 1;
        }

        Self {
            rows: table.records.len(),
            features: geometry.features.len(),
            matched: geometry.features.len() - unmatched_features.len(),
            unmatched_rows,
            unmatched_features,
            regions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CountiesConfig;

    fn table_config() -> TableSourceConfig {
        TableSourceConfig {
            source: "test".into(),
            format: None,
            join_column: "county".into(),
            reserved_columns: 2,
            statistic_columns: None,
            region_column: None,
            accept_invalid_certs: false,
        }
    }

    fn lookup_config() -> RegionLookupConfig {
        RegionLookupConfig {
            source: "test".into(),
            county_column: "county".into(),
            region_column: "Region".into(),
            accept_invalid_certs: false,
        }
    }

    const CSV: &str = "fid,county,total_disasters,total_flood,total_fire\n\
                       1,Harris,5,3,\n\
                       2,Travis,3,1,2\n\
                       3,Loving,0,0,0\n";

    #[test]
    fn csv_statistic_columns_skip_reserved() {
        let raw = read_csv(CSV.as_bytes(), "test").unwrap();
        let table = build_table(raw, &table_config(), "test").unwrap();

        assert_eq!(table.statistic_columns, vec!["total_disasters", "total_flood", "total_fire"]);
        assert_eq!(table.records.len(), 3);

        let harris = table.get("Harris").unwrap();
        assert_eq!(harris.value("total_disasters"), Some(5.0));
        assert_eq!(harris.value("total_fire"), None);
        assert_eq!(harris.region, None);
    }

    #[test]
    fn explicit_statistic_columns_override() {
        let mut config = table_config();
        config.statistic_columns = Some(vec!["total_fire".into()]);
        let raw = read_csv(CSV.as_bytes(), "test").unwrap();
        let table = build_table(raw, &config, "test").unwrap();
        assert_eq!(table.statistic_columns, vec!["total_fire"]);

        config.statistic_columns = Some(vec!["total_hail".into()]);
        let raw = read_csv(CSV.as_bytes(), "test").unwrap();
        assert!(matches!(build_table(raw, &config, "test"), Err(LoadError::Schema { .. })));
    }

    #[test]
    fn missing_join_column_is_schema_error() {
        let raw = read_csv(b"fid,name,total\n1,Harris,5\n", "test").unwrap();
        let err = build_table(raw, &table_config(), "test").unwrap_err();
        assert!(err.to_string().contains("join column 'county' not found"));
    }

    #[test]
    fn non_numeric_statistic_is_schema_error() {
        let raw = read_csv(b"fid,county,total\n1,Harris,lots\n", "test").unwrap();
        let err = build_table(raw, &table_config(), "test").unwrap_err();
        assert!(matches!(err, LoadError::Schema { .. }));
        assert!(err.to_string().contains("'lots'"));
    }

    #[test]
    fn duplicate_county_is_rejected() {
        let raw = read_csv(b"fid,county,total\n1,Harris,5\n2,Harris,6\n", "test").unwrap();
        let err = build_table(raw, &table_config(), "test").unwrap_err();
        assert!(matches!(err, LoadError::DuplicateKey { ref key, .. } if key == "Harris"));
    }

    #[test]
    fn feature_properties_become_rows_in_order() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": null,
                 "properties": {"fid": 1, "county": "Harris", "total_disasters": 5, "total_flood": null}},
                {"type": "Feature", "geometry": null,
                 "properties": {"fid": 2, "county": "Travis", "total_disasters": 3, "total_flood": "2"}}
            ]
        }"#;
        let raw = read_feature_properties(json.as_bytes(), "wfs").unwrap();
        assert_eq!(raw.columns, vec!["fid", "county", "total_disasters", "total_flood"]);

        let table = build_table(raw, &table_config(), "wfs").unwrap();
        assert_eq!(table.statistic_columns, vec!["total_disasters", "total_flood"]);
        assert_eq!(table.get("Harris").unwrap().value("total_flood"), None);
        assert_eq!(table.get("Travis").unwrap().value("total_flood"), Some(2.0));
    }

    #[test]
    fn non_collection_geojson_is_rejected() {
        let json = r#"{"type": "Point", "coordinates": [0.0, 0.0]}"#;
        assert!(matches!(
            read_feature_properties(json.as_bytes(), "wfs"),
            Err(LoadError::Schema { .. })
        ));
        assert!(matches!(
            read_feature_properties(b"not json", "wfs"),
            Err(LoadError::Malformed { .. })
        ));
    }

    #[test]
    fn region_join_is_left_join() {
        let raw = read_csv(CSV.as_bytes(), "test").unwrap();
        let mut table = build_table(raw, &table_config(), "test").unwrap();
        let lookup = parse_region_lookup(
            b"county,Region\nHarris,2\nTravis,3.0\nBrewster,6\n",
            &lookup_config(),
            "regions",
        )
        .unwrap();

        join_regions(&mut table, &lookup);

        assert_eq!(table.records.len(), 3);
        assert_eq!(table.get("Harris").unwrap().region, Some(RegionId(2)));
        assert_eq!(table.get("Travis").unwrap().region, Some(RegionId(3)));
        assert_eq!(table.get("Loving").unwrap().region, None);
        assert!(table.get("Brewster").is_none());
    }

    #[test]
    fn region_lookup_rejects_bad_ids() {
        let err = parse_region_lookup(b"county,Region\nHarris,north\n", &lookup_config(), "regions")
            .unwrap_err();
        assert!(matches!(err, LoadError::Schema { .. }));

        let lookup = parse_region_lookup(b"county,Region\nHarris,\n", &lookup_config(), "regions").unwrap();
        assert_eq!(lookup.0.get("Harris"), Some(&None));
    }

    #[test]
    fn region_column_is_read_not_a_statistic() {
        let mut config = table_config();
        config.reserved_columns = 1;
        config.region_column = Some("Region".into());

        let raw = read_csv(b"county,total_disasters,Region\nHarris,5,2\nTravis,3,\n", "test").unwrap();
        let table = build_table(raw, &config, "test").unwrap();
        assert_eq!(table.statistic_columns, vec!["total_disasters"]);
        assert_eq!(table.get("Harris").unwrap().region, Some(RegionId(2)));
        assert_eq!(table.get("Travis").unwrap().region, None);

        let raw = read_csv(b"county,total_disasters,Region\nHarris,5,north\n", "test").unwrap();
        let err = build_table(raw, &config, "test").unwrap_err();
        assert!(err.to_string().contains("invalid region 'north'"));

        config.region_column = Some("region_id".into());
        let raw = read_csv(b"county,total_disasters,Region\nHarris,5,2\n", "test").unwrap();
        assert!(matches!(build_table(raw, &config, "test"), Err(LoadError::Schema { .. })));
    }

    #[test]
    fn numeric_region_property_is_read() {
        let mut config = table_config();
        config.region_column = Some("Region".into());
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": null,
                 "properties": {"fid": 1, "county": "Harris", "total_disasters": 5, "Region": 2}}
            ]
        }"#;
        let raw = read_feature_properties(json.as_bytes(), "wfs").unwrap();
        let table = build_table(raw, &config, "wfs").unwrap();
        assert_eq!(table.statistic_columns, vec!["total_disasters"]);
        assert_eq!(table.get("Harris").unwrap().region, Some(RegionId(2)));
    }

    #[test]
    fn csv_cells_keep_surrounding_spaces() {
        let raw = read_csv(b" fid , county ,total\n1, Harris , 5 \n2,Travis,  \n", "test").unwrap();
        assert_eq!(raw.columns, vec!["fid", "county", "total"]);

        let table = build_table(raw, &table_config(), "test").unwrap();
        assert!(table.get("Harris").is_none());
        assert_eq!(table.get(" Harris ").unwrap().value("total"), Some(5.0));
        assert_eq!(table.get("Travis").unwrap().value("total"), None);
    }

    #[test]
    fn load_table_reads_files_and_joins() {
        let dir = tempfile::tempdir().unwrap();
        let disasters = dir.path().join("disasters.csv");
        let regions = dir.path().join("regions.csv");
        std::fs::write(&disasters, CSV).unwrap();
        std::fs::write(&regions, "county,Region\nHarris,2\n").unwrap();

        let input = InputConfig {
            disasters: TableSourceConfig {
                source: disasters.to_string_lossy().into_owned(),
                ..table_config()
            },
            region_lookup: Some(RegionLookupConfig {
                source: regions.to_string_lossy().into_owned(),
                ..lookup_config()
            }),
            counties: CountiesConfig {
                source: "unused".into(),
                state_property: "STATE".into(),
                state_code: "48".into(),
                name_property: "NAME".into(),
                accept_invalid_certs: false,
            },
            boundaries: None,
        };

        let table = load_table(&input).unwrap();
        assert_eq!(table.records.len(), 3);
        assert_eq!(table.get("Harris").unwrap().region, Some(RegionId(2)));
        assert_eq!(table.get("Travis").unwrap().region, None);
    }

    #[test]
    fn join_report_counts_both_sides() {
        let raw = read_csv(CSV.as_bytes(), "test").unwrap();
        let mut table = build_table(raw, &table_config(), "test").unwrap();
        table.records[0].region = Some(RegionId(2));

        let geometry = crate::render::tests::geometry();
        let report = JoinReport::new(&table, &geometry);

        assert_eq!(report.rows, 3);
        assert_eq!(report.features, 3);
        assert_eq!(report.matched, 3);
        assert!(report.unmatched_rows.is_empty());

        table.records.retain(|r| r.county != "Loving");
        table.records.push(CountyRecord {
            county: "Harris County".into(),
            stats: HashMap::new(),
            region: None,
        });
        let report = JoinReport::new(&table, &geometry);
        assert_eq!(report.matched, 2);
        assert_eq!(report.unmatched_rows, vec!["Harris County"]);
        assert_eq!(report.unmatched_features, vec!["Loving"]);
        assert_eq!(report.regions.get(&Some(RegionId(2))), Some(&1));
        assert_eq!(report.regions.get(&None), Some(&2));
    }
}
