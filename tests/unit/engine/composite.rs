use super::*;

#[test]
fn over_opaque_replaces() {
    assert_eq!(over([10, 20, 30, 255], [1, 2, 3, 255], 1.0), [1, 2, 3, 255]);
}

#[test]
fn over_zero_opacity_is_identity() {
    assert_eq!(over([10, 20, 30, 255], [1, 2, 3, 255], 0.0), [10, 20, 30, 255]);
}

#[test]
fn over_half_opacity_mixes() {
    let out = over([0, 0, 0, 255], [255, 255, 255, 255], 0.5);
    assert_eq!(out[3], 255);
    assert!((i32::from(out[0]) - 128).abs() <= 1);
}

#[test]
fn add_saturates() {
    assert_eq!(add([200, 0, 0, 255], [100, 10, 0, 255], 1.0), [255, 10, 0, 255]);
}

#[test]
fn blend_in_place_rejects_mismatched_buffers() {
    let mut dst = vec![0u8; 8];
    assert!(blend_in_place(&mut dst, &[0u8; 4], BlendMode::Normal, 1.0).is_err());
    assert!(blend_in_place(&mut dst, &[255u8; 8], BlendMode::Normal, 1.0).is_ok());
    assert_eq!(dst, vec![255u8; 8]);
}

#[test]
fn non_finite_or_tiny_opacity_leaves_dst() {
    let dst = [10, 20, 30, 40];
    assert_eq!(over(dst, [255, 255, 255, 255], f32::NAN), dst);
    assert_eq!(add(dst, [255, 255, 255, 255], 0.001), dst);
    assert_eq!(over([0, 0, 0, 0], [200, 0, 0, 200], 0.5), [100, 0, 0, 100]);
}
