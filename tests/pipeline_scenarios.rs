//! End-to-end scenarios through the pipeline with an in-memory sink.

use serde_json::{json, Value};
use std::sync::Arc;
use stock_anomaly_detector::config::{AppConfig, ScorerConfig};
use stock_anomaly_detector::metrics::PipelineMetrics;
use stock_anomaly_detector::scorer::ScorerPhase;
use stock_anomaly_detector::{AnomalyDetector, AnomalyLabel, MemorySink, Outcome, Pipeline};

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.scorer = ScorerConfig {
        n_estimators: 100,
        seed: Some(2024),
        background_retrain: false,
        ..ScorerConfig::default()
    };
    config
}

fn pipeline(config: &AppConfig) -> (Pipeline<MemorySink>, MemorySink) {
    let sink = MemorySink::new();
    let pipeline = Pipeline::new(
        AnomalyDetector::new(config),
        sink.clone(),
        Arc::new(PipelineMetrics::new()),
    );
    (pipeline, sink)
}

fn trade(sequence: i64, symbol: &str, price: f64, size: f64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "sequence": sequence,
        "symbol": symbol,
        "price": price,
        "size": size,
    }))
    .unwrap()
}

fn payloads(sink: &MemorySink) -> Vec<Value> {
    sink.records()
        .iter()
        .map(|r| serde_json::from_slice(&r.payload).unwrap())
        .collect()
}

#[tokio::test]
async fn duplicate_then_rapid_price_change() {
    let (mut pipeline, sink) = pipeline(&config());

    let first = br#"{"sequence": 1, "symbol": "X", "price": 100, "size": 50}"#;
    assert_eq!(pipeline.handle(first).await.unwrap(), Outcome::Clean);
    assert_eq!(pipeline.handle(first).await.unwrap(), Outcome::Duplicate);
    assert_eq!(
        pipeline
            .handle(br#"{"sequence": 2, "symbol": "X", "price": 106, "size": 50}"#)
            .await
            .unwrap(),
        Outcome::Published(vec![AnomalyLabel::RapidPriceChange])
    );

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, "2");
    assert_eq!(
        payloads(&sink)[0],
        json!({
            "sequence": 2,
            "symbol": "X",
            "price": 106,
            "size": 50,
            "anomalies": ["Rapid Price Change"]
        })
    );
}

#[tokio::test]
async fn high_volume_with_default_thresholds() {
    let (mut pipeline, sink) = pipeline(&config());

    pipeline
        .handle(br#"{"sequence": 3, "symbol": "Y", "price": 50, "size": 20000}"#)
        .await
        .unwrap();

    assert_eq!(sink.records()[0].key, "3");
    assert_eq!(payloads(&sink)[0]["anomalies"], json!(["High Volume"]));
}

#[tokio::test]
async fn redelivery_is_idempotent() {
    let (mut pipeline, sink) = pipeline(&config());

    pipeline.handle(&trade(10, "D", 100.0, 1.0)).await.unwrap();
    assert_eq!(
        pipeline.handle(&trade(11, "D", 130.0, 50_000.0)).await.unwrap(),
        Outcome::Published(vec![AnomalyLabel::HighVolume, AnomalyLabel::RapidPriceChange])
    );
    for _ in 0..5 {
        assert_eq!(
            pipeline.handle(&trade(11, "D", 130.0, 50_000.0)).await.unwrap(),
            Outcome::Duplicate
        );
    }

    assert_eq!(sink.len(), 1);
    let detector = pipeline.detector();
    assert_eq!(detector.rules().symbol_state("D").unwrap().price_history().len(), 2);
    assert_eq!(detector.scorer().sample_count(), 2);
}

#[tokio::test]
async fn malformed_payloads_leave_no_trace() {
    let (mut pipeline, sink) = pipeline(&config());

    let payloads: [&[u8]; 4] = [
        b"{oops",
        br#"{"sequence": 1, "symbol": "X"}"#,
        br#"{"sequence": 1, "symbol": "X", "price": "abc", "size": 1}"#,
        br#""not an object""#,
    ];
    for payload in payloads {
        assert_eq!(pipeline.handle(payload).await.unwrap(), Outcome::Malformed);
    }

    assert!(sink.is_empty());
    let detector = pipeline.detector();
    assert!(detector.dedup().is_empty());
    assert_eq!(detector.rules().symbol_count(), 0);
    assert_eq!(detector.scorer().sample_count(), 0);
}

#[tokio::test]
async fn outlier_scorer_warms_up_then_flags() {
    let (mut pipeline, sink) = pipeline(&config());

    // huge prices during warm-up never get the outlier label
    for seq in 0..99 {
        let price = if seq % 10 == 0 { 1e6 } else { 100.0 + (seq % 7) as f64 * 0.1 };
        let outcome = pipeline
            .handle(&trade(seq, &format!("W{}", seq), price, 1.0))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Clean);
    }
    assert!(sink.is_empty());
    assert_eq!(pipeline.detector().scorer().phase(), ScorerPhase::Warming);

    for seq in 99..1000 {
        let price = 100.0 + (seq % 7) as f64 * 0.1;
        pipeline
            .handle(&trade(seq, &format!("S{}", seq % 40), price, 1.0))
            .await
            .unwrap();
    }
    assert_eq!(pipeline.detector().scorer().phase(), ScorerPhase::Fitted);
    assert_eq!(pipeline.detector().scorer().model_generation(), 1);

    let outcome = pipeline.handle(&trade(5000, "LATE", 5e7, 1.0)).await.unwrap();
    assert_eq!(outcome, Outcome::Published(vec![AnomalyLabel::IsolationForest]));
}

#[tokio::test]
async fn extra_fields_round_trip_to_output() {
    let (mut pipeline, sink) = pipeline(&config());

    pipeline
        .handle(
            br#"{"sequence": "ab-7", "symbol": "Q", "price": 12.5, "size": 99999, "exchange": "NYSE", "conditions": ["@", "F"]}"#,
        )
        .await
        .unwrap();

    let out = &payloads(&sink)[0];
    assert_eq!(sink.records()[0].key, "ab-7");
    assert_eq!(out["exchange"], "NYSE");
    assert_eq!(out["conditions"], json!(["@", "F"]));
    assert_eq!(out["anomalies"], json!(["High Volume"]));
}

#[tokio::test]
async fn bounded_dedup_window_forgets_old_sequences() {
    let mut config = config();
    config.dedup.window = Some(2);
    let (mut pipeline, _sink) = pipeline(&config);

    assert_eq!(pipeline.handle(&trade(1, "B", 10.0, 1.0)).await.unwrap(), Outcome::Clean);
    assert_eq!(pipeline.handle(&trade(2, "B", 10.0, 1.0)).await.unwrap(), Outcome::Clean);
    assert_eq!(pipeline.handle(&trade(2, "B", 10.0, 1.0)).await.unwrap(), Outcome::Duplicate);
    assert_eq!(pipeline.handle(&trade(3, "B", 10.0, 1.0)).await.unwrap(), Outcome::Clean);
    assert_eq!(pipeline.handle(&trade(1, "B", 10.0, 1.0)).await.unwrap(), Outcome::Clean);
}
