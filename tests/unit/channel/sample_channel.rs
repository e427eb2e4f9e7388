use super::*;

fn tagged(i: u32) -> Sample {
    Sample::new(Image::new(1, 1), Context::new()).with_number("seq", f64::from(i))
}

fn seq(rec: &SampleRecord) -> u32 {
    rec.sample.numeric["seq"] as u32
}

#[test]
fn single_producer_order_is_preserved() {
    let mut ch = EventChannel::new(SampleChannelOpts {
        capacity: None,
        overflow: OverflowPolicy::Block,
    });
    let sink = ch.open_session(1);
    let producer = std::thread::spawn(move || {
        for i in 1..=200 {
            assert_eq!(sink.emit(tagged(i)), Emit::Queued);
        }
    });
    producer.join().unwrap();

    let mut got = Vec::new();
    while let Some(rec) = ch.try_recv() {
        assert_eq!(rec.session, 1);
        got.push(seq(&rec));
    }
    assert_eq!(got, (1..=200).collect::<Vec<_>>());
    assert_eq!(ch.stats().queued, 200);
}

#[test]
fn per_producer_order_survives_interleaving() {
    let mut ch = EventChannel::new(SampleChannelOpts {
        capacity: Some(8),
        overflow: OverflowPolicy::Block,
    });
    let producers: Vec<_> = (0..3)
        .map(|p| {
            let sink = ch.open_session(1);
            std::thread::spawn(move || {
                for i in 0..50u32 {
                    let s = tagged(i).with_number("producer", f64::from(p));
                    assert_eq!(sink.emit(s), Emit::Queued);
                }
            })
        })
        .collect();

    let mut last = [None::<u32>; 3];
    let mut total = 0;
    while total < 150 {
        match ch.receiver().recv_timeout(Duration::from_secs(5)) {
            Ok(rec) => {
                let p = rec.sample.numeric["producer"] as usize;
                let s = seq(&rec);
                if let Some(prev) = last[p] {
                    assert!(s > prev, "producer {p} delivered {s} after {prev}");
                }
                last[p] = Some(s);
                total += 1;
            }
            Err(e) => panic!("timed out waiting for samples: {e}"),
        }
    }
    for h in producers {
        h.join().unwrap();
    }
}

#[test]
fn drop_newest_counts_overflow() {
    let mut ch = EventChannel::new(SampleChannelOpts {
        capacity: Some(2),
        overflow: OverflowPolicy::DropNewest,
    });
    let sink = ch.open_session(7);
    assert_eq!(sink.emit(tagged(1)), Emit::Queued);
    assert_eq!(sink.emit(tagged(2)), Emit::Queued);
    assert_eq!(sink.emit(tagged(3)), Emit::Dropped);
    let st = ch.stats();
    assert_eq!(st.queued, 2);
    assert_eq!(st.dropped, 1);
}

#[test]
fn blocked_producer_is_released_by_close() {
    let mut ch = EventChannel::new(SampleChannelOpts {
        capacity: Some(1),
        overflow: OverflowPolicy::Block,
    });
    let sink = ch.open_session(1);
    assert_eq!(sink.emit(tagged(1)), Emit::Queued);

    let blocked = std::thread::spawn(move || sink.emit(tagged(2)));
    std::thread::sleep(Duration::from_millis(30));
    ch.close_session();
    assert_eq!(blocked.join().unwrap(), Emit::Dropped);
    assert_eq!(ch.stats().dropped, 1);
}

#[test]
fn emit_after_host_is_gone_reports_disconnect() {
    let mut ch = EventChannel::new(SampleChannelOpts::default());
    let sink = ch.open_session(1);
    // Forget the session flag so dropping the host side does not close it first.
    ch.closing = None;
    drop(ch);
    assert_eq!(sink.emit(tagged(1)), Emit::Disconnected);
}

#[test]
fn metadata_merge_prefers_text() {
    let mut numeric = BTreeMap::new();
    numeric.insert("a".to_string(), 1.0);
    numeric.insert("b".to_string(), 2.0);
    let mut text = BTreeMap::new();
    text.insert("b".to_string(), "two".to_string());
    let meta = Sample::merged_metadata(numeric, text);
    assert_eq!(meta["a"].as_f64(), Some(1.0));
    assert_eq!(meta["b"].as_str(), Some("two"));
}
