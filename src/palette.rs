//! Named continuous color scales.
//!
//! Stops are evenly spaced over `[0, 1]`. A `_r` suffix on a name (or the reversed flag) flips the
//! scale; both together cancel out.

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn lerp(self, other: Color, t: f64) -> Color {
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Color::rgb(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.to_hex())
    }
}

const VIRIDIS: &[&str] = &[
    "#440154", "#482878", "#3e4989", "#31688e", "#26828e", "#1f9e89", "#35b779", "#6ece58", "#b5de2b", "#fde725",
];
const PLASMA: &[&str] = &[
    "#0d0887", "#46039f", "#7201a8", "#9c179e", "#bd3786", "#d8576b", "#ed7953", "#fb9f3a", "#fdca26", "#f0f921",
];
const INFERNO: &[&str] = &[
    "#000004", "#1b0c41", "#4a0c6b", "#781c6d", "#a52c60", "#cf4446", "#ed6925", "#fb9b06", "#f7d13d", "#fcffa4",
];
const MAGMA: &[&str] = &[
    "#000004", "#180f3d", "#440f76", "#721f81", "#9e2f7f", "#cd4071", "#f1605d", "#fd9668", "#feca8d", "#fcfdbf",
];
const CIVIDIS: &[&str] = &[
    "#00224e", "#123570", "#3b496c", "#575d6d", "#707173", "#8a8678", "#a59c74", "#c3b369", "#e1cc55", "#fee838",
];
const REDS: &[&str] = &[
    "#fff5f0", "#fee0d2", "#fcbba1", "#fc9272", "#fb6a4a", "#ef3b2c", "#cb181d", "#a50f15", "#67000d",
];
const BLUES: &[&str] = &[
    "#f7fbff", "#deebf7", "#c6dbef", "#9ecae1", "#6baed6", "#4292c6", "#2171b5", "#08519c", "#08306b",
];
const GREENS: &[&str] = &[
    "#f7fcf5", "#e5f5e0", "#c7e9c0", "#a1d99b", "#74c476", "#41ab5d", "#238b45", "#006d2c", "#00441b",
];
const ORANGES: &[&str] = &[
    "#fff5eb", "#fee6ce", "#fdd0a2", "#fdae6b", "#fd8d3c", "#f16913", "#d94801", "#a63603", "#7f2704",
];
const PURPLES: &[&str] = &[
    "#fcfbfd", "#efedf5", "#dadaeb", "#bcbddc", "#9e9ac8", "#807dba", "#6a51a3", "#54278f", "#3f007d",
];
const GREYS: &[&str] = &[
    "#ffffff", "#f0f0f0", "#d9d9d9", "#bdbdbd", "#969696", "#737373", "#525252", "#252525", "#000000",
];
const YLORRD: &[&str] = &[
    "#ffffcc", "#ffeda0", "#fed976", "#feb24c", "#fd8d3c", "#fc4e2a", "#e31a1c", "#bd0026", "#800026",
];
const YLGNBU: &[&str] = &[
    "#ffffd9", "#edf8b1", "#c7e9b4", "#7fcdbb", "#41b6c4", "#1d91c0", "#225ea8", "#253494", "#081d58",
];

const CATALOG: &[(&str, &[&str])] = &[
    ("Viridis", VIRIDIS),
    ("Plasma", PLASMA),
    ("Inferno", INFERNO),
    ("Magma", MAGMA),
    ("Cividis", CIVIDIS),
    ("Reds", REDS),
    ("Blues", BLUES),
    ("Greens", GREENS),
    ("Oranges", ORANGES),
    ("Purples", PURPLES),
    ("Greys", GREYS),
    ("YlOrRd", YLORRD),
    ("YlGnBu", YLGNBU),
];

pub fn names() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|(name, _)| *name)
}

/// A resolved scale: colors ordered from the domain minimum to the maximum.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorScale {
    pub name: &'static str,
    pub reversed: bool,
    colors: Vec<Color>,
}

impl ColorScale {
    /// Case-insensitive lookup; `None` when the name is not in the catalog.
    pub fn lookup(name: &str, reversed: bool) -> Option<Self> {
        let (base, suffixed) = match name.strip_suffix("_r") {
            Some(base) => (base, true),
            None => (name, false),
        };
        let (canonical, hexes) = CATALOG.iter().find(|(n, _)| n.eq_ignore_ascii_case(base))?;

        let reversed = reversed ^ suffixed;
        let mut colors: Vec<Color> = hexes.iter().filter_map(|h| Color::from_hex(h)).collect();
        if reversed {
            colors.reverse();
        }

        Some(Self { name: canonical, reversed, colors })
    }

    /// Color at position `t` in `[0, 1]`, clamped.
    pub fn at(&self, t: f64) -> Color {
        let t = if t.is_nan() { 0.5 } else { t.clamp(0.0, 1.0) };
        let segments = (self.colors.len() - 1) as f64;
        let pos = t * segments;
        let i = (pos.floor() as usize).min(self.colors.len() - 2);
        self.colors[i].lerp(self.colors[i + 1], pos - i as f64)
    }

    /// `(position, color)` pairs, evenly spaced.
    pub fn stops(&self) -> Vec<(f64, Color)> {
        let segments = (self.colors.len() - 1) as f64;
        self.colors
            .iter()
            .enumerate()
            .map(|(i, c)| (i as f64 / segments, *c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalog_entry_resolves() {
        for name in names() {
            let scale = ColorScale::lookup(name, false).unwrap();
            assert!(scale.stops().len() >= 2, "{name}");
        }
    }

    #[test]
    fn lookup_is_case_insensitive_and_rejects_unknown() {
        assert_eq!(ColorScale::lookup("viridis", false).unwrap().name, "Viridis");
        assert!(ColorScale::lookup("Rainbowz", false).is_none());
        assert!(ColorScale::lookup("", false).is_none());
    }

    #[test]
    fn endpoints_match_first_and_last_stop() {
        let scale = ColorScale::lookup("Viridis", false).unwrap();
        assert_eq!(scale.at(0.0).to_hex(), "#440154");
        assert_eq!(scale.at(1.0).to_hex(), "#fde725");
        assert_eq!(scale.at(-3.0), scale.at(0.0));
        assert_eq!(scale.at(7.0), scale.at(1.0));
    }

    #[test]
    fn reversal_inverts_ordering() {
        let forward = ColorScale::lookup("Reds", false).unwrap();
        let reversed = ColorScale::lookup("Reds", true).unwrap();
        for t in [0.0, 0.1, 0.37, 0.5, 0.8, 1.0] {
            assert_eq!(forward.at(t), reversed.at(1.0 - t));
        }
    }

    #[test]
    fn suffix_and_flag_cancel() {
        let suffixed = ColorScale::lookup("Blues_r", false).unwrap();
        assert!(suffixed.reversed);
        assert_eq!(suffixed.name, "Blues");
        let both = ColorScale::lookup("Blues_r", true).unwrap();
        assert!(!both.reversed);
        assert_eq!(both, ColorScale::lookup("Blues", false).unwrap());
    }

    #[test]
    fn hex_parsing() {
        assert_eq!(Color::from_hex("#000080"), Some(Color::rgb(0, 0, 128)));
        assert_eq!(Color::from_hex("ff0000"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(Color::from_hex("navy"), None);
        assert_eq!(Color::rgb(0, 0, 128).to_hex(), "#000080");
    }

    #[test]
    fn color_serializes_as_hex() {
        assert_eq!(serde_json::to_string(&Color::rgb(1, 2, 3)).unwrap(), "\"#010203\"");
    }
}
