use super::*;
use crate::foundation::opts::{OverflowPolicy, SampleChannelOpts};

const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];

fn two_layer() -> CpuEngine {
    let e = CpuEngine::new(2, 2).unwrap();
    e.add_layer("bg", Image::filled(2, 2, RED)).unwrap();
    e.add_layer("fg", Image::filled(2, 2, BLUE)).unwrap();
    e
}

#[test]
fn render_composites_bottom_up() {
    let e = two_layer();
    let img = e.render(&SizeKey::full()).unwrap();
    assert_eq!((img.width(), img.height()), (2, 2));
    assert_eq!(img.pixel(1, 1), Some(BLUE));
}

#[test]
fn hidden_layer_is_skipped() {
    let e = two_layer();
    let mut ctx = e.context();
    ctx.get_mut("fg").unwrap().visible = false;
    let img = e.render_context(&ctx, &SizeKey::full()).unwrap();
    assert_eq!(img.pixel(0, 0), Some(RED));
}

#[test]
fn up_to_layer_dims_layers_above() {
    let e = two_layer();
    let ctx = e.context();
    let img = e
        .render_up_to_layer(&ctx, "bg", "", 0.0, &SizeKey::full())
        .unwrap();
    assert_eq!(img.pixel(0, 0), Some(RED));

    let full = e
        .render_up_to_layer(&ctx, "fg", "root", 0.0, &SizeKey::full())
        .unwrap();
    assert_eq!(full.pixel(0, 0), Some(BLUE));
}

#[test]
fn up_to_layer_rejects_unknown_precomp_and_layer() {
    let e = two_layer();
    let ctx = e.context();
    assert!(matches!(
        e.render_up_to_layer(&ctx, "bg", "nested", 0.5, &SizeKey::full()),
        Err(BridgeError::Engine(_))
    ));
    assert!(matches!(
        e.render_up_to_layer(&ctx, "nope", "", 0.5, &SizeKey::full()),
        Err(BridgeError::Engine(_))
    ));
}

#[test]
fn unknown_size_is_engine_error() {
    let e = two_layer();
    let err = e.render(&SizeKey::new("thumb").unwrap()).unwrap_err();
    assert!(matches!(err, BridgeError::Engine(_)));
}

#[test]
fn cache_size_downscales_layers() {
    let e = CpuEngine::new(4, 4).unwrap();
    e.add_layer("bg", Image::filled(4, 4, RED)).unwrap();
    e.add_cache_size("half", 0.5).unwrap();
    let size = SizeKey::new("half").unwrap();
    assert_eq!(e.dimensions(&size).unwrap(), (2, 2));
    assert_eq!(e.cache_scale("half"), Some(0.5));
    assert_eq!(e.cache_scale("full"), Some(1.0));
    assert_eq!(e.cache_sizes(), vec!["full".to_string(), "half".to_string()]);
    let img = e.render(&size).unwrap();
    assert_eq!(img.pixel(1, 1), Some(RED));

    e.add_layer("fg", Image::filled(4, 4, BLUE)).unwrap();
    assert_eq!(e.cached_image("fg", &size).unwrap().width(), 2);
    assert!(e.add_cache_size("full", 0.5).is_err());
    assert!(e.add_cache_size("tiny", 0.0).is_err());
}

#[test]
fn render_only_layer_isolates_one_layer() {
    let e = two_layer();
    let img = e
        .render_only_layer(&e.context(), "bg", &SizeKey::full())
        .unwrap();
    assert_eq!(img.pixel(0, 0), Some(RED));
}

#[test]
fn delete_layer_drops_engine_storage() {
    let e = two_layer();
    let weak = Arc::downgrade(&e.layer_image("fg").unwrap());
    assert!(e.delete_layer("fg"));
    assert!(!e.delete_layer("fg"));
    assert!(weak.upgrade().is_none());
    assert_eq!(e.layer_names(), vec!["bg".to_string()]);
}

#[test]
fn add_layer_rejects_wrong_dimensions_and_duplicates() {
    let e = two_layer();
    assert!(matches!(
        e.add_layer("big", Image::new(3, 3)),
        Err(BridgeError::Argument(_))
    ));
    assert!(matches!(
        e.add_layer("bg", Image::new(2, 2)),
        Err(BridgeError::Argument(_))
    ));
}

#[test]
fn stop_when_idle_is_ok() {
    let e = two_layer();
    assert!(e.stop_search().is_ok());
}

#[test]
fn search_emits_bounded_samples_per_thread() {
    let e = two_layer();
    let mut ch = crate::channel::EventChannel::new(SampleChannelOpts {
        capacity: None,
        overflow: OverflowPolicy::Block,
    });
    let sink = ch.open_session(1);
    let mut options = crate::foundation::core::SearchOptions::new();
    options.insert("maxSamples".to_string(), 5.0);
    e.start_search(
        sink,
        SearchRequest {
            mode: RANDOM_SEARCH,
            options,
            threads: 2,
            size: SizeKey::full(),
        },
    )
    .unwrap();
    e.stop_search().unwrap();
    // Threads may be stopped before finishing; every record must still be well-formed.
    let mut per_thread = [0u64; 2];
    while let Some(rec) = ch.try_recv() {
        assert_eq!(rec.session, 1);
        let t = rec.sample.numeric["thread"] as usize;
        assert_eq!(rec.sample.numeric["iteration"] as u64, per_thread[t]);
        per_thread[t] += 1;
        assert_eq!(rec.sample.text["mode"], "random");
    }
    assert!(per_thread.iter().all(|n| *n <= 5));
}

#[test]
fn unsupported_mode_is_rejected() {
    let e = two_layer();
    let mut ch = crate::channel::EventChannel::new(SampleChannelOpts::default());
    let err = e
        .start_search(
            ch.open_session(1),
            SearchRequest {
                mode: SearchMode(7),
                options: Default::default(),
                threads: 1,
                size: SizeKey::full(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, BridgeError::Engine(_)));
}
