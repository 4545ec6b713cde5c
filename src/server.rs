use crate::config::AppConfig;
use crate::error::RenderError;
use crate::raster;
use crate::types::ReferenceData;
use crate::view::{self, ControlOptions, ViewState};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use geo::algorithm::contains::Contains;
use geo::bounding_rect::BoundingRect;
use geo::Point;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

// Wrapper for RTree indexing
pub struct CountyIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for CountyIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Shared by every request; nothing in it changes after startup.
pub struct AppState {
    pub reference: ReferenceData,
    pub tree: RTree<CountyIndex>,
    pub options: ControlOptions,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig, reference: ReferenceData) -> Self {
        let tree_items: Vec<CountyIndex> = reference
            .geometry
            .features
            .iter()
            .enumerate()
            .filter_map(|(i, feature)| {
                let rect = feature.geometry.bounding_rect()?;
                Some(CountyIndex {
                    index: i,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        let tree = RTree::bulk_load(tree_items);
        let options = ControlOptions::new(&reference.table, &config.controls);

        Self { reference, tree, options, config }
    }

    /// Fills unset controls with their defaults and validates the rest.
    fn view_from(&self, query: &ViewQuery) -> Result<ViewState, RenderError> {
        let mut state = ViewState::default_for(&self.reference.table, &self.config.controls);
        if let Some(column) = &query.column {
            state.column = column.clone();
        }
        if let Some(region) = &query.region {
            state.region = view::parse_region(region)?;
        }
        if let Some(scale) = &query.scale {
            state.color_scale = scale.clone();
        }
        if let Some(reversed) = &query.reversed {
            state.reversed = view::parse_reversed(reversed)?;
        }
        Ok(state)
    }
}

#[derive(Deserialize, Default)]
pub struct ViewQuery {
    column: Option<String>,
    region: Option<String>,
    scale: Option<String>,
    reversed: Option<String>,
}

#[derive(Deserialize)]
pub struct PointQuery {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
pub struct CountyResponse {
    county: String,
    region: Option<u8>,
    stats: Vec<StatValue>,
}

#[derive(Serialize)]
pub struct StatValue {
    column: String,
    value: Option<f64>,
}

impl IntoResponse for RenderError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (StatusCode::UNPROCESSABLE_ENTITY, body).into_response()
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/options", get(options_handler))
        .route("/api/figure", get(figure_handler))
        .route("/api/map.png", get(map_handler))
        .route("/api/county", get(county_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, reference: ReferenceData) -> Result<()> {
    info!("Building spatial index for {} counties...", reference.geometry.features.len());
    let addr = SocketAddr::from((config.server.host, config.server.port));
    let state = Arc::new(AppState::new(config, reference));

    let app = build_router(state);

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(index_page(&state.options))
}

async fn options_handler(State(state): State<Arc<AppState>>) -> Json<ControlOptions> {
    Json(state.options.clone())
}

async fn figure_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<crate::render::Figure>, RenderError> {
    let view = state.view_from(&query)?;
    debug!("Figure request: {:?}", view);
    let figure = view::recompute(&view, &state.reference, &state.config.map)?;
    Ok(Json(figure))
}

async fn map_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewQuery>,
) -> Result<Response, RenderError> {
    let view = state.view_from(&query)?;
    debug!("Map request: {:?}", view);
    let figure = view::recompute(&view, &state.reference, &state.config.map)?;

    let shared = Arc::clone(&state);
    let encoded = tokio::task::spawn_blocking(move || {
        let img = raster::rasterize(
            &figure,
            &shared.reference.geometry,
            shared.reference.boundaries.as_ref(),
            shared.reference.basemap.as_ref(),
        );
        raster::encode_png(&img)
    })
    .await;

    Ok(match encoded {
        Ok(Ok(png)) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Ok(Err(e)) => {
            error!("Failed to encode map: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            error!("Map render task failed: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    })
}

async fn county_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PointQuery>,
) -> Json<Option<CountyResponse>> {
    let point = Point::new(params.lon, params.lat);
    let envelope = AABB::from_point([params.lon, params.lat]);

    // Query RTree
    let candidates = state.tree.locate_in_envelope_intersecting(&envelope);

    for candidate in candidates {
        if let Some(feature) = state.reference.geometry.features.get(candidate.index) {
            if feature.geometry.contains(&point) {
                let record = state.reference.table.get(&feature.name);
                let stats = state
                    .reference
                    .table
                    .statistic_columns
                    .iter()
                    .map(|column| StatValue {
                        column: column.clone(),
                        value: record.and_then(|r| r.value(column)),
                    })
                    .collect();
                return Json(Some(CountyResponse {
                    county: feature.name.clone(),
                    region: record.and_then(|r| r.region).map(|r| r.0),
                    stats,
                }));
            }
        }
    }

    Json(None)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn select(id: &str, label: &str, choices: &[String], selected: &str) -> String {
    let options: String = choices
        .iter()
        .map(|c| {
            let c = escape_html(c);
            let marker = if c == escape_html(selected) { " selected" } else { "" };
            format!("<option value=\"{c}\"{marker}>{c}</option>")
        })
        .collect();
    format!("<label>{label} <select id=\"{id}\">{options}</select></label>")
}

fn index_page(options: &ControlOptions) -> String {
    let controls = [
        select("column", "Statistic", &options.columns, &options.default_column),
        select("region", "Region", &options.regions, "All"),
        select("scale", "Color scale", &options.color_scales, &options.default_color_scale),
        select("reversed", "Reverse", &options.reversed, "No"),
    ]
    .join("\n");

    INDEX_TEMPLATE.replace("__CONTROLS__", &controls)
}

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>SHMP Mapping Visualization</title>
<style>
body { font-family: sans-serif; margin: 1.5em; background: #f8f5f0; color: #3e3f3a; }
.controls { display: flex; gap: 1em; flex-wrap: wrap; margin-bottom: 1em; }
.error { color: #d9534f; padding: 2em 0; }
</style>
</head>
<body>
<h1>SHMP Mapping Visualization</h1>
<div class="controls">
__CONTROLS__
</div>
<h2 id="heading"></h2>
<div id="map"></div>
<script>
const controls = ["column", "region", "scale", "reversed"];
let latest = 0;

async function update() {
  const ticket = ++latest;
  const params = new URLSearchParams();
  controls.forEach(id => params.set(id, document.getElementById(id).value));
  const out = document.getElementById("map");
  const heading = document.getElementById("heading");
  try {
    const resp = await fetch("/api/map.png?" + params);
    if (ticket !== latest) return;
    if (resp.ok) {
      const blob = await resp.blob();
      if (ticket !== latest) return;
      const img = new Image();
      img.src = URL.createObjectURL(blob);
      heading.textContent = "Map for " + params.get("column");
      out.replaceChildren(img);
    } else {
      const body = await resp.json().catch(() => ({ error: resp.statusText }));
      heading.textContent = "";
      const msg = document.createElement("p");
      msg.className = "error";
      msg.textContent = body.error;
      out.replaceChildren(msg);
    }
  } catch (e) {
    if (ticket === latest) out.textContent = String(e);
  }
}

controls.forEach(id => document.getElementById(id).addEventListener("change", update));
update();
</script>
</body>
</html>
"#;
