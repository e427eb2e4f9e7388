use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        BridgeError::argument("x")
            .to_string()
            .contains("argument error:")
    );
    assert!(
        BridgeError::invalid_handle("x")
            .to_string()
            .contains("invalid handle:")
    );
    assert!(
        BridgeError::engine("x")
            .to_string()
            .contains("engine error:")
    );
    assert!(
        BridgeError::session_busy("x")
            .to_string()
            .contains("session busy:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = BridgeError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
