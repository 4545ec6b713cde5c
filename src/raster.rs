use crate::basemap::Basemap;
use crate::palette::Color;
use crate::projection::Viewport;
use crate::render::{Figure, MapLayer};
use crate::types::{BoundaryOverlay, GeometryCollection};
use geo::algorithm::contains::Contains;
use geo::bounding_rect::BoundingRect;
use geo::Point;
use image::{ImageFormat, Rgba, RgbaImage};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use std::io::Cursor;

// Wrapper for RTree indexing of filled counties
struct FillIndex {
    feature: usize,
    color: Color,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for FillIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

impl Figure {
    pub fn viewport(&self) -> Viewport {
        Viewport {
            center_lon: self.layout.center_lon,
            center_lat: self.layout.center_lat,
            zoom: self.layout.zoom,
            width: self.layout.width,
            height: self.layout.height,
        }
    }
}

/// Draws the figure's fills over the basemap (or a plain background), then its boundary layer on top.
///
/// `geometry` must be the collection the figure was rendered from; fills are matched by position.
/// The basemap is only drawn when the figure carries a raster layer.
pub fn rasterize(
    figure: &Figure,
    geometry: &GeometryCollection,
    boundaries: Option<&BoundaryOverlay>,
    basemap: Option<&Basemap>,
) -> RgbaImage {
    let viewport = figure.viewport();
    let background = figure.layout.background;
    let opacity = figure.layout.opacity;
    let basemap = basemap.filter(|_| figure.layers.iter().any(|l| matches!(l, MapLayer::Raster { .. })));

    let items: Vec<FillIndex> = figure
        .traces
        .iter()
        .flat_map(|trace| trace.fills.iter().enumerate())
        .filter_map(|(i, fill)| {
            let color = fill.color?;
            let rect = geometry.features.get(i)?.geometry.bounding_rect()?;
            Some(FillIndex {
                feature: i,
                color,
                aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
            })
        })
        .collect();
    let tree = RTree::bulk_load(items);

    let width = viewport.width;
    let mut img = RgbaImage::from_pixel(width, viewport.height, to_rgba(background));
    let buf: &mut [u8] = &mut img;

    buf.par_chunks_mut(width as usize * 4)
        .enumerate()
        .for_each(|(py, row)| {
            for px in 0..width as usize {
                let (lon, lat) = viewport.unproject(px as f64 + 0.5, py as f64 + 0.5);
                let point = Point::new(lon, lat);
                let hit = tree
                    .locate_in_envelope_intersecting(&AABB::from_point([lon, lat]))
                    .find(|item| {
                        geometry
                            .features
                            .get(item.feature)
                            .map_or(false, |f| f.geometry.contains(&point))
                    });
                let base = basemap
                    .and_then(|b| b.sample(lon, lat))
                    .map_or(background, |p| Color::rgb(p[0], p[1], p[2]));
                let c = match hit {
                    Some(item) => base.lerp(item.color, opacity),
                    None if basemap.is_some() => base,
                    None => continue,
                };
                row[px * 4..px * 4 + 4].copy_from_slice(&[c.r, c.g, c.b, 255]);
            }
        });

    if let Some(overlay) = boundaries {
        for layer in &figure.layers {
            if let MapLayer::Line { color, width, .. } = layer {
                draw_overlay(&mut img, &viewport, overlay, *color, *width);
            }
        }
    }

    img
}

fn to_rgba(c: Color) -> Rgba<u8> {
    Rgba([c.r, c.g, c.b, 255])
}

fn draw_overlay(img: &mut RgbaImage, viewport: &Viewport, overlay: &BoundaryOverlay, color: Color, width: u32) {
    let pixel = to_rgba(color);
    for line in &overlay.lines {
        let projected: Vec<(f64, f64)> = line.coords().map(|c| viewport.project(c.x, c.y)).collect();
        for pair in projected.windows(2) {
            draw_segment(img, pair[0], pair[1], width.max(1), pixel);
        }
    }
}

fn draw_segment(img: &mut RgbaImage, from: (f64, f64), to: (f64, f64), width: u32, pixel: Rgba<u8>) {
    let (w, h) = (img.width() as f64, img.height() as f64);
    let pad = width as f64;
    // Skip segments entirely off-canvas.
    if (from.0 < -pad && to.0 < -pad)
        || (from.0 > w + pad && to.0 > w + pad)
        || (from.1 < -pad && to.1 < -pad)
        || (from.1 > h + pad && to.1 > h + pad)
    {
        return;
    }

    let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).ceil().max(1.0) as usize;
    let half = (width as i64 - 1) / 2;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let x = (from.0 + (to.0 - from.0) * t).floor() as i64;
        let y = (from.1 + (to.1 - from.1) * t).floor() as i64;
        for dy in -half..=(width as i64 - 1 - half) {
            for dx in -half..=(width as i64 - 1 - half) {
                let (sx, sy) = (x + dx, y + dy);
                if sx >= 0 && sy >= 0 && (sx as f64) < w && (sy as f64) < h {
                    img.put_pixel(sx as u32, sy as u32, pixel);
                }
            }
        }
    }
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}
