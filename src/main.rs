//! Stock Anomaly Detector - Main Entry Point
//!
//! Consumes trades from a NATS JetStream stream, runs the detectors and publishes
//! annotated anomalies.

use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use stock_anomaly_detector::{
    config::{AppConfig, LoggingConfig},
    consumer::TradeConsumer,
    detector::AnomalyDetector,
    metrics::{MetricsReporter, PipelineMetrics},
    pipeline::Pipeline,
    producer::AnomalyProducer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("stock_anomaly_detector={}", logging.level)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if present)
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Load configuration
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Stock Anomaly Detector");
    info!(
        "Rule defaults: volume > {}, price change > {:.2}%, {} overrides",
        config.rules.volume_threshold,
        config.rules.price_change_threshold * 100.0,
        config.rules.overrides.len()
    );
    info!(
        "Outlier scorer: warm-up {} samples, refit every {} samples, {} trees, {} refits",
        config.scorer.min_samples,
        config.scorer.retrain_interval,
        config.scorer.n_estimators,
        if config.scorer.background_retrain {
            "background"
        } else {
            "inline"
        }
    );

    // Initialize metrics
    let metrics = Arc::new(PipelineMetrics::new());

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    // Initialize consumer and producer
    let consumer = TradeConsumer::new(client.clone(), &config.nats);
    let producer = AnomalyProducer::new(client.clone(), &config.nats.output_subject, &config.producer);
    info!("Publishing anomalies to: {}", producer.subject());

    let mut pipeline = Pipeline::new(
        AnomalyDetector::new(&config),
        producer.clone(),
        metrics.clone(),
    );

    // Start metrics reporter
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let mut messages = consumer.subscribe().await?;
    info!("Listening on subject: {}", consumer.subject());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let message = tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupt received");
                break;
            }
            next = messages.next() => match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    warn!(error = %e, "Failed to receive message");
                    continue;
                }
                None => {
                    warn!("Trade stream closed");
                    break;
                }
            },
        };

        if let Err(e) = pipeline.handle(&message.payload).await {
            error!(
                key = %e.key(),
                error = %e,
                payload = %String::from_utf8_lossy(&message.payload),
                "Anomaly lost"
            );
        }

        // a redelivery would only be dropped as a duplicate, so ack either way
        if let Err(e) = message.ack().await {
            warn!(error = %e, "Failed to acknowledge message");
        }
    }

    // Print final summary
    info!("Pipeline shutting down...");
    // joining trainer threads blocks
    let detector = tokio::task::spawn_blocking(move || pipeline.shutdown()).await?;
    info!(
        symbols = detector.rules().symbol_count(),
        corpus = detector.scorer().sample_count(),
        model_generation = detector.scorer().model_generation(),
        "Detector state at shutdown"
    );
    if let Err(e) = producer.flush().await {
        warn!(error = %e, "Failed to flush pending anomalies");
    }
    metrics.print_summary();

    Ok(())
}
