use super::*;

#[test]
fn image_rejects_mismatched_buffer() {
    let err = Image::from_rgba8(2, 2, vec![0; 15]).unwrap_err();
    assert!(matches!(err, BridgeError::Argument(_)));
    assert!(Image::from_rgba8(2, 2, vec![0; 16]).is_ok());
}

#[test]
fn straight_alpha_is_premultiplied() {
    let img = Image::from_straight_rgba8(1, 1, vec![255, 128, 0, 128]).unwrap();
    assert_eq!(img.pixel(0, 0), Some([128, 64, 0, 128]));
    assert_eq!(img.pixel(1, 0), None);
}

#[test]
fn rgba_image_conversion_unpremultiplies() {
    let img = Image::from_rgba8(1, 1, vec![128, 64, 0, 128]).unwrap();
    let out = img.to_rgba_image().unwrap();
    let px = out.get_pixel(0, 0).0;
    assert_eq!(px[3], 128);
    assert!((i32::from(px[0]) - 255).abs() <= 1);
    assert!((i32::from(px[1]) - 128).abs() <= 1);
}

#[test]
fn size_key_resolution() {
    assert!(SizeKey::resolve(None).unwrap().is_full());
    assert_eq!(SizeKey::resolve(Some("thumb")).unwrap().as_str(), "thumb");
    assert!(matches!(
        SizeKey::resolve(Some("")),
        Err(BridgeError::Argument(_))
    ));
}

#[test]
fn context_copies_are_independent() {
    let mut a = Context::new();
    a.insert("bg", LayerState::default());
    let mut b = a.clone();
    b.get_mut("bg").unwrap().opacity = 0.25;
    assert_eq!(a.get("bg").unwrap().opacity, 1.0);
    assert_eq!(b.get("bg").unwrap().opacity, 0.25);
}

#[test]
fn layer_state_defaults_from_json() {
    let st: LayerState = serde_json::from_str("{}").unwrap();
    assert_eq!(st, LayerState::default());
    let st: LayerState = serde_json::from_str(r#"{"opacity":0.5,"blend":"add"}"#).unwrap();
    assert_eq!(st.blend, BlendMode::Add);
    assert!(st.visible);
}
