use std::f64::consts::PI;

// Map zoom levels use 512px tiles, so zoom 0 shows the world in 512px.
const TILE_SIZE: f64 = 512.0;

/// Lon/lat to pixel coordinates on a Web Mercator world `world_size` pixels wide.
pub fn mercator_pixel(lon: f64, lat: f64, world_size: f64) -> (f64, f64) {
    let x = (lon + 180.0) / 360.0 * world_size;
    let lat_rad = lat.to_radians();
    let y = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0 * world_size;
    (x, y)
}

/// Web Mercator view centred on a lon/lat at a fractional zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center_lon: f64,
    pub center_lat: f64,
    pub zoom: f64,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    fn world_size(&self) -> f64 {
        TILE_SIZE * 2.0_f64.powf(self.zoom)
    }

    /// Lon/lat to global pixel coordinates at this zoom.
    fn to_world(&self, lon: f64, lat: f64) -> (f64, f64) {
        mercator_pixel(lon, lat, self.world_size())
    }

    /// Lon/lat to image pixel coordinates (may fall outside the image).
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (cx, cy) = self.to_world(self.center_lon, self.center_lat);
        let (x, y) = self.to_world(lon, lat);
        (
            x - cx + self.width as f64 / 2.0,
            y - cy + self.height as f64 / 2.0,
        )
    }

    /// Image pixel coordinates to lon/lat.
    pub fn unproject(&self, px: f64, py: f64) -> (f64, f64) {
        let size = self.world_size();
        let (cx, cy) = self.to_world(self.center_lon, self.center_lat);
        let x = px - self.width as f64 / 2.0 + cx;
        let y = py - self.height as f64 / 2.0 + cy;
        let lon = x / size * 360.0 - 180.0;
        let n = PI * (1.0 - 2.0 * y / size);
        let lat = n.sinh().atan().to_degrees();
        (lon, lat)
    }
}
