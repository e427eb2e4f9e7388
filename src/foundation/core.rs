use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;

use crate::foundation::error::{BridgeError, BridgeResult};

/// Size key naming the engine's full-resolution cache.
pub const FULL_SIZE: &str = "full";

/// An RGBA8 raster owned by the caller.
///
/// Pixels are **premultiplied alpha**, tightly packed, row-major. This is the native object the
/// engine allocates for every render and the payload of every sample event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Image {
    /// Create a fully transparent image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; byte_len(width, height)],
        }
    }

    /// Create an image where every pixel is `rgba` (premultiplied).
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(byte_len(width, height));
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Wrap premultiplied RGBA8 bytes. The buffer length must be `width * height * 4`.
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> BridgeResult<Self> {
        let expected = byte_len(width, height);
        if data.len() != expected {
            return Err(BridgeError::argument(format!(
                "image buffer is {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Wrap straight-alpha RGBA8 bytes, premultiplying them.
    pub fn from_straight_rgba8(width: u32, height: u32, mut data: Vec<u8>) -> BridgeResult<Self> {
        for px in data.chunks_exact_mut(4) {
            let a = u16::from(px[3]);
            for c in &mut px[..3] {
                *c = mul_div255(u16::from(*c), a);
            }
        }
        Self::from_rgba8(width, height, data)
    }

    /// Image width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Premultiplied RGBA8 bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable premultiplied RGBA8 bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the image, returning its bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Read one pixel, `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    /// Convert to a straight-alpha [`image::RgbaImage`].
    pub fn to_rgba_image(&self) -> BridgeResult<image::RgbaImage> {
        let mut straight = self.data.clone();
        for px in straight.chunks_exact_mut(4) {
            let a = px[3];
            if a == 0 || a == 255 {
                continue;
            }
            for c in &mut px[..3] {
                *c = ((u16::from(*c) * 255 + u16::from(a) / 2) / u16::from(a)).min(255) as u8;
            }
        }
        image::RgbaImage::from_raw(self.width, self.height, straight)
            .ok_or_else(|| BridgeError::engine("image buffer does not match its dimensions"))
    }

    /// Write the image as a PNG file.
    pub fn save_png(&self, path: &Path) -> BridgeResult<()> {
        self.to_rgba_image()?
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("write png '{}'", path.display()))?;
        Ok(())
    }
}

fn byte_len(width: u32, height: u32) -> usize {
    (width as usize)
        .saturating_mul(height as usize)
        .saturating_mul(4)
}

/// `x * y / 255`, rounded to nearest.
pub(crate) fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

/// Layer blending mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Premultiplied source-over.
    #[default]
    Normal,
    /// Saturating additive blend.
    Add,
}

/// Per-layer parameters carried by a [`Context`].
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerState {
    /// Whether the layer participates in compositing.
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Layer opacity in `0..=1`.
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    /// Blend mode used when the layer is composited.
    #[serde(default)]
    pub blend: BlendMode,
}

impl Default for LayerState {
    fn default() -> Self {
        Self {
            visible: true,
            opacity: 1.0,
            blend: BlendMode::Normal,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> f32 {
    1.0
}

/// A name-keyed snapshot of layer states.
///
/// Contexts cross the bridge by value: every accessor returns a copy, and every async operation
/// that takes one captures its own copy before returning.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Context {
    layers: BTreeMap<String, LayerState>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a layer state.
    pub fn insert(&mut self, name: impl Into<String>, state: LayerState) -> Option<LayerState> {
        self.layers.insert(name.into(), state)
    }

    /// Remove a layer state.
    pub fn remove(&mut self, name: &str) -> Option<LayerState> {
        self.layers.remove(name)
    }

    /// Look up a layer state.
    pub fn get(&self, name: &str) -> Option<&LayerState> {
        self.layers.get(name)
    }

    /// Look up a layer state mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut LayerState> {
        self.layers.get_mut(name)
    }

    /// Return `true` when `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    /// Layer names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    /// Iterate `(name, state)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LayerState)> {
        self.layers.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate states mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut LayerState)> {
        self.layers.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Return `true` when the context holds no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Names one of the engine's resolution caches.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SizeKey(String);

impl SizeKey {
    /// The full-resolution cache.
    pub fn full() -> Self {
        Self(FULL_SIZE.to_string())
    }

    /// Create a size key. Empty keys are rejected.
    pub fn new(key: impl Into<String>) -> BridgeResult<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(BridgeError::argument("size key must be non-empty when given"));
        }
        Ok(Self(key))
    }

    /// Resolve the optional size argument of the host surface. `None` means full resolution.
    pub fn resolve(key: Option<&str>) -> BridgeResult<Self> {
        match key {
            None => Ok(Self::full()),
            Some(k) => Self::new(k),
        }
    }

    /// Borrow the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return `true` for the full-resolution key.
    pub fn is_full(&self) -> bool {
        self.0 == FULL_SIZE
    }
}

impl std::fmt::Display for SizeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Engine-defined search mode. The bridge passes it through uninterpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SearchMode(pub u32);

/// Named numeric search options.
pub type SearchOptions = BTreeMap<String, f32>;

/// One value in a sample's metadata.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// Numeric metadata.
    Number(f64),
    /// String metadata.
    Text(String),
}

impl MetaValue {
    /// The numeric value, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    /// The string value, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Number(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

/// Merged metadata delivered to host listeners.
pub type Metadata = BTreeMap<String, MetaValue>;

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
