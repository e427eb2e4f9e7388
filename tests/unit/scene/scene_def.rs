use super::*;
use crate::engine::Engine;
use crate::foundation::core::SizeKey;

const SCENE: &str = r##"{
  "width": 4, "height": 2,
  "layers": [
    { "name": "bg", "fill": "#ff0000" },
    { "name": "glow", "fill": [0, 0, 255, 255], "opacity": 0.0, "blend": "add" }
  ],
  "cache_sizes": { "half": 0.5 }
}"##;

#[test]
fn builds_engine_from_json() {
    let def = SceneDef::from_json_str(SCENE).unwrap();
    let engine = def.build_engine(Path::new(".")).unwrap();
    assert_eq!(engine.layer_names(), vec!["bg".to_string(), "glow".to_string()]);
    assert_eq!(engine.context().get("glow").unwrap().blend, BlendMode::Add);
    let img = engine.render(&SizeKey::full()).unwrap();
    assert_eq!(img.pixel(3, 1), Some([255, 0, 0, 255]));
    assert_eq!(engine.dimensions(&SizeKey::new("half").unwrap()).unwrap(), (2, 1));
}

#[test]
fn hex_colours_parse() {
    assert_eq!(parse_hex("#01020304").unwrap(), [1, 2, 3, 4]);
    assert_eq!(parse_hex("0a0b0c").unwrap(), [10, 11, 12, 255]);
    assert!(parse_hex("#12").is_err());
    assert!(parse_hex("#zzzzzz").is_err());
}

#[test]
fn layer_needs_exactly_one_source() {
    let def = SceneDef::from_json_str(
        r#"{"width": 1, "height": 1, "layers": [{"name": "x"}]}"#,
    )
    .unwrap();
    assert!(matches!(
        def.build_engine(Path::new(".")),
        Err(BridgeError::Argument(_))
    ));
}

#[test]
fn unknown_fields_are_rejected() {
    assert!(SceneDef::from_json_str(r#"{"width": 1, "height": 1, "layers": [], "fps": 30}"#).is_err());
}
