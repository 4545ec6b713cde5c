use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub controls: ControlsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub disasters: TableSourceConfig,
    pub region_lookup: Option<RegionLookupConfig>,
    pub counties: CountiesConfig,
    pub boundaries: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    Csv,
    Geojson,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TableSourceConfig {
    /// Local path or http(s) URL.
    pub source: String,
    pub format: Option<TableFormat>,
    #[serde(default = "default_county_column")]
    pub join_column: String,
    /// Leading columns that never hold statistics (e.g. `fid`, `county`).
    #[serde(default = "default_reserved_columns")]
    pub reserved_columns: usize,
    /// Explicit statistic columns; overrides `reserved_columns` when set.
    pub statistic_columns: Option<Vec<String>>,
    /// Column already holding the region id (pre-merged exports). Never a statistic.
    pub region_column: Option<String>,
    /// Skip TLS certificate checks for this source only (the SHMP GeoServer ships a broken chain).
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegionLookupConfig {
    pub source: String,
    #[serde(default = "default_county_column")]
    pub county_column: String,
    #[serde(default = "default_region_column")]
    pub region_column: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CountiesConfig {
    pub source: String,
    #[serde(default = "default_state_property")]
    pub state_property: String,
    #[serde(default = "default_state_code")]
    pub state_code: String,
    #[serde(default = "default_name_property")]
    pub name_property: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MapConfig {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: f64,
    pub width: u32,
    pub height: u32,
    pub opacity: f64,
    pub background: String,
    pub boundary_color: String,
    pub boundary_width: u32,
    pub basemap_tiles: Option<String>,
    pub basemap_attribution: Option<String>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center_lat: 31.3966,
            center_lon: -99.5,
            zoom: 5.0,
            width: 900,
            height: 700,
            opacity: 0.75,
            background: "#ffffff".to_string(),
            boundary_color: "#000080".to_string(),
            boundary_width: 3,
            basemap_tiles: None,
            basemap_attribution: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ControlsConfig {
    pub region_count: u8,
    pub default_color_scale: String,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            region_count: 6,
            default_color_scale: "Viridis".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: [u8; 4],
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: [127, 0, 0, 1],
            port: 8050,
        }
    }
}

fn default_county_column() -> String {
    "county".to_string()
}

fn default_region_column() -> String {
    "Region".to_string()
}

fn default_reserved_columns() -> usize {
    2
}

fn default_state_property() -> String {
    "STATE".to_string()
}

fn default_state_code() -> String {
    "48".to_string()
}

fn default_name_property() -> String {
    "NAME".to_string()
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
