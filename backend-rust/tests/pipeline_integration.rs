//! End-to-end: line source → decoder → channel → consumer → history.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use uwb_tracker::source::{pump, status_channel, ReaderSource, SourceStatus};
use uwb_tracker::{
    ingest_channel, run_consumer, run_producer, stop_signal, SourceSpec, TrackerContext, TrackerHandle,
};
use uwb_types::{AnchorMap, Measurement, Position};

fn room() -> AnchorMap {
    [
        ("A1".to_string(), Position::new(0.0, 0.0)),
        ("A2".to_string(), Position::new(6.0, 0.0)),
        ("A3".to_string(), Position::new(6.0, 4.5)),
        ("A4".to_string(), Position::new(0.0, 4.5)),
    ]
    .into()
}

fn report_lines(anchors: &AnchorMap, truth: Position) -> String {
    anchors
        .iter()
        .map(|(id, p)| format!("12:00:00.000 -> [TAG] {id} = {:.4} m\n", p.distance_to(&truth)))
        .collect()
}

async fn eventually<F, Fut>(what: &str, check: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn last_applied_range_wins() {
    let shared = TrackerContext::new(room(), None, 16).into_shared();
    let handle = TrackerHandle::new(shared.clone());
    let (tx, rx) = ingest_channel();
    let (stop, signal) = stop_signal();

    tx.push(Measurement::new(1, "A1", 5.0));
    tx.push(Measurement::new(2, "A1", 7.0));
    let consumer = tokio::spawn(run_consumer(shared, rx, Duration::from_millis(5), signal));

    let h = &handle;
    eventually("A1 range", || async move { h.current_distances().await.get("A1") == Some(&7.0) }).await;
    stop.stop();
    consumer.await.unwrap();
}

#[tokio::test]
async fn replayed_lines_produce_a_fix() {
    let truth = Position::new(2.25, 1.5);
    let mut text = String::from("boot banner\n[TAG] A9 = garbage\n");
    text.push_str(&report_lines(&room(), truth));

    let shared = TrackerContext::new(room(), None, 16).into_shared();
    let handle = TrackerHandle::new(shared.clone());
    let (tx, rx) = ingest_channel();
    let (stop, signal) = stop_signal();
    let (status_tx, status_rx) = status_channel();

    let source = ReaderSource::new(std::io::Cursor::new(text.into_bytes()), "replay");
    let stats = pump(source, tx, signal.clone(), status_tx).await;
    assert_eq!(stats.measurements, 4);
    assert_eq!(stats.skipped, 2);
    assert_eq!(*status_rx.borrow(), SourceStatus::EndOfStream);

    let consumer = tokio::spawn(run_consumer(shared, rx, Duration::from_millis(5), signal));
    let h = &handle;
    eventually("a position", || async move { h.current_position().await.is_some() }).await;

    let fix = handle.current_position().await.unwrap();
    assert!(fix.position().distance_to(&truth) < 1e-3, "{fix:?}");
    assert_eq!(handle.history(None).await.len(), 1);

    stop.stop();
    consumer.await.unwrap();
}

#[tokio::test]
async fn log_file_replay_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.log");
    let truth = Position::new(4.0, 3.0);
    let mut file = tokio::fs::File::create(&path).await.unwrap();
    file.write_all(report_lines(&room(), truth).as_bytes()).await.unwrap();
    file.flush().await.unwrap();
    drop(file);

    let shared = TrackerContext::new(room(), None, 16).into_shared();
    let handle = TrackerHandle::new(shared.clone());
    let (tx, rx) = ingest_channel();
    let (stop, signal) = stop_signal();
    let (status_tx, mut status_rx) = status_channel();

    let spec = SourceSpec::LogFile { path, replay_delay: Duration::from_millis(1) };
    let producer = tokio::spawn(run_producer(spec, tx, signal.clone(), status_tx));
    let consumer = tokio::spawn(run_consumer(shared, rx, Duration::from_millis(5), signal));

    status_rx.wait_for(SourceStatus::is_terminal).await.unwrap();
    assert_eq!(*status_rx.borrow(), SourceStatus::EndOfStream);
    assert_eq!(producer.await.unwrap().measurements, 4);

    let h = &handle;
    eventually("a position", || async move { h.current_position().await.is_some() }).await;
    let fix = handle.current_position().await.unwrap();
    assert!(fix.position().distance_to(&truth) < 1e-3);

    stop.stop();
    consumer.await.unwrap();
}

#[tokio::test]
async fn unavailable_source_leaves_tracker_queryable() {
    let shared = TrackerContext::new(room(), None, 16).into_shared();
    let handle = TrackerHandle::new(shared.clone());

    // Earlier history survives the producer failing
    let seed = room()
        .iter()
        .map(|(id, p)| Measurement::new(1, id.clone(), p.distance_to(&Position::new(1.0, 1.0))))
        .collect();
    shared.write().await.apply_batch(seed);

    let (tx, rx) = ingest_channel();
    let (stop, signal) = stop_signal();
    let (status_tx, status_rx) = status_channel();
    let spec = SourceSpec::LogFile { path: "/nonexistent/uwb.log".into(), replay_delay: Duration::ZERO };

    let consumer = tokio::spawn(run_consumer(shared, rx, Duration::from_millis(5), signal.clone()));
    run_producer(spec, tx, signal, status_tx).await;

    assert!(matches!(*status_rx.borrow(), SourceStatus::Unavailable { .. }));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!consumer.is_finished());
    assert_eq!(handle.history(None).await.len(), 1);
    assert_eq!(handle.anchors().await.len(), 4);

    stop.stop();
    consumer.await.unwrap();
}

#[tokio::test]
async fn stop_ends_a_live_pipeline_promptly() {
    let (mut writer, reader) = tokio::io::duplex(1024);
    let shared = TrackerContext::new(room(), None, 16).into_shared();
    let (tx, rx) = ingest_channel();
    let (stop, signal) = stop_signal();
    let (status_tx, status_rx) = status_channel();

    let source = ReaderSource::new(tokio::io::BufReader::new(reader), "live");
    let producer = tokio::spawn(pump(source, tx, signal.clone(), status_tx));
    let consumer = tokio::spawn(run_consumer(shared.clone(), rx, Duration::from_millis(5), signal));

    writer.write_all(b"[TAG] A1 = 1.0 m\n").await.unwrap();
    let probe = &TrackerHandle::new(shared);
    eventually("first range", || async move { probe.current_distances().await.contains_key("A1") }).await;

    stop.stop();
    let both = async { (producer.await.unwrap(), consumer.await.unwrap()) };
    let (produced, _) = tokio::time::timeout(Duration::from_secs(1), both).await.unwrap();
    assert_eq!(produced.measurements, 1);
    assert_eq!(*status_rx.borrow(), SourceStatus::Stopped);
}
