//! JSON scene files used to build a [`CpuEngine`].
//!
//! ```json
//! {
//!   "width": 64, "height": 64,
//!   "layers": [
//!     { "name": "bg", "fill": "#202020" },
//!     { "name": "logo", "path": "logo.png", "opacity": 0.8, "blend": "add" }
//!   ],
//!   "cache_sizes": { "thumb": 0.25 }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::engine::Engine;
use crate::engine::cpu::CpuEngine;
use crate::foundation::core::{BlendMode, Image, LayerState};
use crate::foundation::error::{BridgeError, BridgeResult};

/// Top-level scene document.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneDef {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Layers, bottom first.
    pub layers: Vec<LayerDef>,
    /// Extra scaled caches keyed by size key.
    #[serde(default)]
    pub cache_sizes: BTreeMap<String, f32>,
}

/// One layer of a scene.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerDef {
    /// Unique layer name.
    pub name: String,
    /// Solid fill colour.
    #[serde(default)]
    pub fill: Option<FillDef>,
    /// PNG (or any format the `image` crate decodes), resolved relative to the scene file.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Initial opacity.
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    /// Initial visibility.
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Blend mode.
    #[serde(default)]
    pub blend: BlendMode,
}

fn default_opacity() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

/// Straight-alpha fill colour: `"#rrggbb"`, `"#rrggbbaa"` or `[r, g, b, a]`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum FillDef {
    /// Hex string.
    Hex(String),
    /// Byte array.
    Rgba([u8; 4]),
}

impl FillDef {
    /// Resolve to straight-alpha RGBA8.
    pub fn to_rgba8(&self) -> BridgeResult<[u8; 4]> {
        match self {
            Self::Rgba(c) => Ok(*c),
            Self::Hex(s) => parse_hex(s),
        }
    }
}

fn parse_hex(s: &str) -> BridgeResult<[u8; 4]> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    let byte = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .ok_or_else(|| BridgeError::argument(format!("invalid hex colour '{s}'")))
    };
    match hex.len() {
        6 => Ok([byte(0)?, byte(2)?, byte(4)?, 255]),
        8 => Ok([byte(0)?, byte(2)?, byte(4)?, byte(6)?]),
        _ => Err(BridgeError::argument(format!("invalid hex colour '{s}'"))),
    }
}

impl SceneDef {
    /// Parse a scene from a JSON string.
    pub fn from_json_str(s: &str) -> BridgeResult<Self> {
        serde_json::from_str(s).map_err(|e| BridgeError::argument(format!("parse scene JSON: {e}")))
    }

    /// Parse a scene from a JSON file on disk.
    pub fn load(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            BridgeError::argument(format!("open scene JSON '{}': {e}", path.display()))
        })?;
        serde_json::from_reader(BufReader::new(f))
            .map_err(|e| BridgeError::argument(format!("parse scene JSON '{}': {e}", path.display())))
    }

    /// Build an engine. Relative layer paths are resolved against `root`.
    #[tracing::instrument(skip(self), fields(layers = self.layers.len()))]
    pub fn build_engine(&self, root: &Path) -> BridgeResult<CpuEngine> {
        let engine = CpuEngine::new(self.width, self.height)?;
        for layer in &self.layers {
            let image = self.layer_image(layer, root)?;
            let state = LayerState {
                visible: layer.visible,
                opacity: layer.opacity.clamp(0.0, 1.0),
                blend: layer.blend,
            };
            engine.add_layer_with_state(layer.name.clone(), image, state)?;
        }
        for (key, scale) in &self.cache_sizes {
            engine.add_cache_size(key, *scale)?;
        }
        Ok(engine)
    }

    fn layer_image(&self, layer: &LayerDef, root: &Path) -> BridgeResult<Image> {
        match (&layer.fill, &layer.path) {
            (Some(fill), None) => {
                let [r, g, b, a] = fill.to_rgba8()?;
                let data = [r, g, b, a].repeat(self.width as usize * self.height as usize);
                Image::from_straight_rgba8(self.width, self.height, data)
            }
            (None, Some(rel)) => {
                let path = root.join(rel);
                let decoded = image::open(&path).map_err(|e| {
                    BridgeError::argument(format!(
                        "layer '{}': decode '{}': {e}",
                        layer.name,
                        path.display()
                    ))
                })?;
                let rgba = decoded.to_rgba8();
                if rgba.width() != self.width || rgba.height() != self.height {
                    return Err(BridgeError::argument(format!(
                        "layer '{}' is {}x{}, scene is {}x{}",
                        layer.name,
                        rgba.width(),
                        rgba.height(),
                        self.width,
                        self.height
                    )));
                }
                Image::from_straight_rgba8(self.width, self.height, rgba.into_raw())
            }
            _ => Err(BridgeError::argument(format!(
                "layer '{}' needs exactly one of 'fill' or 'path'",
                layer.name
            ))),
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/scene/scene_def.rs"]
mod tests;
