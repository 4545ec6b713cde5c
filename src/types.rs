use crate::basemap::Basemap;
use geo::{LineString, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Administrative region a county belongs to (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub u8);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountyRecord {
    pub county: String,
    // Column name -> value; empty cells are absent.
    pub stats: HashMap<String, f64>,
    pub region: Option<RegionId>,
}

impl CountyRecord {
    pub fn value(&self, column: &str) -> Option<f64> {
        self.stats.get(column).copied()
    }
}

/// Disaster statistics keyed by county, with the statistic columns in source order.
#[derive(Debug, Clone, Default)]
pub struct CountyTable {
    pub statistic_columns: Vec<String>,
    pub records: Vec<CountyRecord>,
}

impl CountyTable {
    pub fn has_column(&self, column: &str) -> bool {
        self.statistic_columns.iter().any(|c| c == column)
    }

    pub fn get(&self, county: &str) -> Option<&CountyRecord> {
        self.records.iter().find(|r| r.county == county)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionFilter {
    #[default]
    All,
    Region(RegionId),
}

impl RegionFilter {
    pub fn matches(&self, region: Option<RegionId>) -> bool {
        match self {
            RegionFilter::All => true,
            RegionFilter::Region(id) => region == Some(*id),
        }
    }
}

impl fmt::Display for RegionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionFilter::All => write!(f, "All"),
            RegionFilter::Region(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for RegionFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(RegionFilter::All);
        }
        match s.parse::<u8>() {
            Ok(id) if id > 0 => Ok(RegionFilter::Region(RegionId(id))),
            _ => Err(s.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CountyFeature {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct GeometryCollection {
    /// Feature property the county names were read from.
    pub join_property: String,
    pub features: Vec<CountyFeature>,
}

/// Region outlines drawn over the choropleth; not joined to any data.
#[derive(Debug, Clone, Default)]
pub struct BoundaryOverlay {
    pub lines: Vec<LineString<f64>>,
}

/// Everything loaded at startup. Never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub table: CountyTable,
    pub geometry: GeometryCollection,
    pub boundaries: Option<BoundaryOverlay>,
    pub basemap: Option<Basemap>,
}
