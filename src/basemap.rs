use crate::config::MapConfig;
use crate::error::LoadError;
use crate::projection::{mercator_pixel, Viewport};
use crate::source::Source;
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use tracing::info;

// XYZ tile services serve 256px tiles, one zoom level finer than the 512px map zoom.
const TILE_PIXELS: f64 = 256.0;
const MAX_TILE_ZOOM: u32 = 19;

/// Basemap imagery covering the fixed map view, fetched once at startup.
#[derive(Debug, Clone)]
pub struct Basemap {
    zoom: u32,
    tiles: HashMap<(u32, u32), RgbaImage>,
}

impl Basemap {
    pub fn new(zoom: u32, tiles: HashMap<(u32, u32), RgbaImage>) -> Self {
        Self { zoom, tiles }
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Tile zoom whose 256px tiles best match a 512px map zoom.
    pub fn tile_zoom(map_zoom: f64) -> u32 {
        (map_zoom + 1.0).round().clamp(0.0, MAX_TILE_ZOOM as f64) as u32
    }

    /// `(x, y)` of every tile at `zoom` that intersects the viewport.
    pub fn tiles_covering(viewport: &Viewport, zoom: u32) -> Vec<(u32, u32)> {
        let size = world_size(zoom);
        let (west, north) = viewport.unproject(0.0, 0.0);
        let (east, south) = viewport.unproject(viewport.width as f64, viewport.height as f64);
        let (x0, y0) = mercator_pixel(west, north, size);
        let (x1, y1) = mercator_pixel(east, south, size);

        let last = (1u32 << zoom) - 1;
        let tile = |v: f64| ((v / TILE_PIXELS).floor().max(0.0) as u32).min(last);

        let mut tiles = Vec::new();
        for y in tile(y0)..=tile(y1) {
            for x in tile(x0)..=tile(x1) {
                tiles.push((x, y));
            }
        }
        tiles
    }

    /// Nearest basemap pixel at a lon/lat, if a tile covers it.
    pub fn sample(&self, lon: f64, lat: f64) -> Option<Rgba<u8>> {
        let (x, y) = mercator_pixel(lon, lat, world_size(self.zoom));
        let (fx, fy) = (x / TILE_PIXELS, y / TILE_PIXELS);
        if !(fx >= 0.0 && fy >= 0.0) {
            return None;
        }
        let tile = self.tiles.get(&(fx.floor() as u32, fy.floor() as u32))?;
        let px = ((fx.fract() * tile.width() as f64) as u32).min(tile.width().saturating_sub(1));
        let py = ((fy.fract() * tile.height() as f64) as u32).min(tile.height().saturating_sub(1));
        tile.get_pixel_checked(px, py).copied()
    }
}

fn world_size(zoom: u32) -> f64 {
    TILE_PIXELS * 2.0_f64.powi(zoom as i32)
}

/// Fills `{z}`, `{x}` and `{y}` in a tile URL or path template.
pub fn tile_url(template: &str, zoom: u32, x: u32, y: u32) -> String {
    template
        .replace("{z}", &zoom.to_string())
        .replace("{x}", &x.to_string())
        .replace("{y}", &y.to_string())
}

/// Fetches the tiles under the configured view. `None` when no basemap is configured.
pub fn load_basemap(map: &MapConfig) -> Result<Option<Basemap>, LoadError> {
    let template = match &map.basemap_tiles {
        Some(t) => t,
        None => return Ok(None),
    };

    let viewport = Viewport {
        center_lon: map.center_lon,
        center_lat: map.center_lat,
        zoom: map.zoom,
        width: map.width,
        height: map.height,
    };
    let zoom = Basemap::tile_zoom(map.zoom);

    let mut tiles = HashMap::new();
    for (x, y) in Basemap::tiles_covering(&viewport, zoom) {
        let source = Source::parse(&tile_url(template, zoom, x, y));
        let bytes = source.fetch(false)?;
        let tile = image::load_from_memory(&bytes)
            .map_err(|e| LoadError::malformed(source.location(), e))?
            .to_rgba8();
        tiles.insert((x, y), tile);
    }

    info!("Loaded {} basemap tiles at zoom {}", tiles.len(), zoom);
    Ok(Some(Basemap::new(zoom, tiles)))
}
