use crate::foundation::core::{BlendMode, mul_div255};
use crate::foundation::error::{BridgeError, BridgeResult};

pub type PremulRgba8 = [u8; 4];

/// Opacity as an 8-bit weight; `None` when the layer contributes nothing.
fn weight(opacity: f32) -> Option<u16> {
    let w = (opacity.clamp(0.0, 1.0) * 255.0).round() as u16;
    (w > 0).then_some(w)
}

/// Premultiplied source-over with the source scaled by `opacity`.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let Some(w) = weight(opacity) else {
        return dst;
    };
    let coverage = mul_div255(u16::from(src[3]), w);
    if coverage == 0 {
        return dst;
    }
    let keep = 255 - u16::from(coverage);
    std::array::from_fn(|i| {
        let s = if i == 3 { coverage } else { mul_div255(u16::from(src[i]), w) };
        s.saturating_add(mul_div255(u16::from(dst[i]), keep))
    })
}

/// Additive blend, saturating per channel.
pub fn add(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let Some(w) = weight(opacity) else {
        return dst;
    };
    std::array::from_fn(|i| dst[i].saturating_add(mul_div255(u16::from(src[i]), w)))
}

/// Blend `src` onto `dst` in place. Both buffers must be equal-length RGBA8.
pub fn blend_in_place(
    dst: &mut [u8],
    src: &[u8],
    mode: BlendMode,
    opacity: f32,
) -> BridgeResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(BridgeError::engine(
            "blend_in_place expects equal-length rgba8 buffers",
        ));
    }
    let f = match mode {
        BlendMode::Normal => over,
        BlendMode::Add => add,
    };
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = f([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], opacity);
        d.copy_from_slice(&out);
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/engine/composite.rs"]
mod tests;
