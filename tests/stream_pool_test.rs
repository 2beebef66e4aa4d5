mod common;

use common::{at, blank_frame, rect_mask, settings, t0, StubModel};
use left_things::core_modules::clock::ManualClock;
use left_things::detector::ReportedObject;
use left_things::{
    DetectorConfig, DetectorError, LeftThingsDetector, Report, StreamError, StreamPool,
};

fn stub_stream(clock: &ManualClock) -> LeftThingsDetector {
    let (model, _log) = StubModel::new(Some(rect_mask(80, 60, 20, 20, 40, 40)), &[]);
    LeftThingsDetector::with_model(DetectorConfig::default(), Box::new(model))
        .with_clock(Box::new(clock.clone()))
}

#[tokio::test]
async fn test_streams_are_independent() {
    let clock = ManualClock::new(t0());
    let mut pool = StreamPool::new();
    pool.register("east", stub_stream(&clock)).unwrap();
    pool.register("west", stub_stream(&clock)).unwrap();
    assert_eq!(pool.stream_ids(), vec!["east".to_string(), "west".to_string()]);

    pool.set_settings("east", settings(2, 0, false, false, 1)).await.unwrap();
    pool.on("east").await.unwrap();

    assert!(pool.state("east").await.unwrap());
    assert!(!pool.state("west").await.unwrap());

    pool.process_frame("east", blank_frame(80, 60, at(0))).await.unwrap();
    clock.set(at(3));
    let report = pool.process_frame("east", blank_frame(80, 60, at(3))).await.unwrap();
    assert_eq!(
        report.objects(),
        &[ReportedObject {
            id: 1,
            points: [20, 20, 40, 40],
        }]
    );

    let report = pool.process_frame("west", blank_frame(80, 60, at(3))).await.unwrap();
    assert_eq!(report, Report::Empty);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_settings_errors_are_forwarded() {
    let clock = ManualClock::new(t0());
    let mut pool = StreamPool::new();
    pool.register("cam", stub_stream(&clock)).unwrap();

    let err = pool
        .set_settings("cam", settings(2, 0, false, false, 99))
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::Detector(DetectorError::InvalidMode(99))));

    let params = pool.get_settings("cam").await.unwrap();
    assert_eq!(params.get("mode").map(String::as_str), Some("0"));

    pool.shutdown().await;
}

#[tokio::test]
async fn test_unknown_and_duplicate_streams() {
    let clock = ManualClock::new(t0());
    let mut pool = StreamPool::new();
    pool.register("cam", stub_stream(&clock)).unwrap();

    let err = pool.register("cam", stub_stream(&clock)).unwrap_err();
    assert!(matches!(err, StreamError::AlreadyRegistered(id) if id == "cam"));

    let err = pool.on("nope").await.unwrap_err();
    assert!(matches!(err, StreamError::UnknownStream(id) if id == "nope"));

    pool.remove("cam").await.unwrap();
    assert!(pool.is_empty());
    assert!(matches!(
        pool.off("cam").await.unwrap_err(),
        StreamError::UnknownStream(_)
    ));
}

#[tokio::test]
async fn test_off_through_the_pool_resets_the_stream() {
    let clock = ManualClock::new(t0());
    let mut pool = StreamPool::new();
    pool.register("cam", stub_stream(&clock)).unwrap();

    pool.set_settings("cam", settings(2, 0, false, false, 1)).await.unwrap();
    pool.on("cam").await.unwrap();
    pool.off("cam").await.unwrap();

    assert!(!pool.state("cam").await.unwrap());
    let params = pool.get_settings("cam").await.unwrap();
    assert_eq!(params.get("interval").map(String::as_str), Some("10"));

    pool.shutdown().await;
}
