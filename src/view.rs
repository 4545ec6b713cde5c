use crate::config::{ControlsConfig, MapConfig};
use crate::error::RenderError;
use crate::palette;
use crate::render::{render, Figure, RenderOptions};
use crate::types::{CountyRecord, CountyTable, ReferenceData, RegionFilter, RegionId};
use serde::Serialize;

/// The current selection of the four dashboard controls.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub column: String,
    pub region: RegionFilter,
    pub color_scale: String,
    pub reversed: bool,
}

impl ViewState {
    pub fn default_for(table: &CountyTable, controls: &ControlsConfig) -> Self {
        Self {
            column: table.statistic_columns.first().cloned().unwrap_or_default(),
            region: RegionFilter::All,
            color_scale: controls.default_color_scale.clone(),
            reversed: false,
        }
    }
}

/// Choices offered by each control, plus the initial selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlOptions {
    pub columns: Vec<String>,
    pub regions: Vec<String>,
    pub color_scales: Vec<String>,
    pub reversed: Vec<String>,
    pub default_column: String,
    pub default_color_scale: String,
}

impl ControlOptions {
    pub fn new(table: &CountyTable, controls: &ControlsConfig) -> Self {
        let defaults = ViewState::default_for(table, controls);
        let regions = std::iter::once(RegionFilter::All)
            .chain((1..=controls.region_count).map(|id| RegionFilter::Region(RegionId(id))))
            .map(|r| r.to_string())
            .collect();

        Self {
            columns: table.statistic_columns.clone(),
            regions,
            color_scales: palette::names().map(str::to_string).collect(),
            reversed: vec!["No".to_string(), "Yes".to_string()],
            default_column: defaults.column,
            default_color_scale: defaults.color_scale,
        }
    }
}

/// `Yes`/`No` from the reversal selector (also accepts `true`/`false`).
pub fn parse_reversed(value: &str) -> Result<bool, RenderError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => Err(RenderError::InvalidSelection { control: "reversal", value: value.to_string() }),
    }
}

pub fn parse_region(value: &str) -> Result<RegionFilter, RenderError> {
    value
        .parse()
        .map_err(|value| RenderError::InvalidSelection { control: "region", value })
}

/// Rows shown for a region selection: everything for `All`, else rows in that region.
pub fn filter(table: &CountyTable, region: RegionFilter) -> Vec<&CountyRecord> {
    table.records.iter().filter(|r| region.matches(r.region)).collect()
}

/// Recomputes the figure for a selection. Pure: same inputs give the same figure.
pub fn recompute(view: &ViewState, reference: &ReferenceData, map: &MapConfig) -> Result<Figure, RenderError> {
    if !reference.table.has_column(&view.column) {
        return Err(RenderError::UnknownColumn(view.column.clone()));
    }

    let rows = filter(&reference.table, view.region);
    render(
        &rows,
        &reference.geometry,
        &view.column,
        &RenderOptions {
            color_scale: &view.color_scale,
            reversed: view.reversed,
            boundaries: reference.boundaries.as_ref(),
            map,
        },
    )
}
