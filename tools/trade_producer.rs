//! Test Trade Producer
//!
//! Generates and publishes synthetic trades to NATS for pipeline testing.
//! Usage: trade_producer [nats_url] [subject] [count] [anomaly_rate] [delay_ms]

use anyhow::Context;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

/// Trade structure matching the pipeline's expected format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Trade {
    sequence: u64,
    symbol: String,
    price: f64,
    size: u64,
    exchange: String,
    timestamp: chrono::DateTime<Utc>,
}

const SYMBOLS: [(&str, f64); 6] = [
    ("AAPL", 189.0),
    ("MSFT", 410.0),
    ("NVDA", 880.0),
    ("TSLA", 175.0),
    ("AMZN", 178.0),
    ("GOOG", 152.0),
];

/// Trade generator for testing
struct TradeGenerator {
    rng: rand::rngs::ThreadRng,
    sequence: u64,
    last_prices: HashMap<&'static str, f64>,
}

impl TradeGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            sequence: 0,
            last_prices: SYMBOLS.iter().copied().collect(),
        }
    }

    fn next_trade(&mut self, symbol: &'static str, price: f64, size: u64) -> Trade {
        self.sequence += 1;
        self.last_prices.insert(symbol, price);
        Trade {
            sequence: self.sequence,
            symbol: symbol.to_string(),
            price: (price * 100.0).round() / 100.0,
            size,
            exchange: self.random_choice(&["NASDAQ", "NYSE", "ARCA", "BATS"]).to_string(),
            timestamp: Utc::now(),
        }
    }

    fn random_symbol(&mut self) -> (&'static str, f64) {
        let (symbol, _) = SYMBOLS[self.rng.gen_range(0..SYMBOLS.len())];
        (symbol, self.last_prices[symbol])
    }

    /// Small random walk step with ordinary size
    fn generate_normal(&mut self) -> Trade {
        let (symbol, last) = self.random_symbol();
        let price = last * (1.0 + self.rng.gen_range(-0.004..0.004));
        let size = self.rng.gen_range(1..2_000);
        self.next_trade(symbol, price, size)
    }

    /// Block trade above the default volume threshold
    fn generate_volume_spike(&mut self) -> Trade {
        let (symbol, last) = self.random_symbol();
        let size = self.rng.gen_range(10_001..100_000);
        self.next_trade(symbol, last, size)
    }

    /// Price jump above the default 5% change threshold
    fn generate_price_jump(&mut self) -> Trade {
        let (symbol, last) = self.random_symbol();
        let direction = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let price = last * (1.0 + direction * self.rng.gen_range(0.06..0.25));
        let size = self.rng.gen_range(1..2_000);
        self.next_trade(symbol, price, size)
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

/// Next trade to send; occasionally repeats the previous one to exercise dedup.
fn next_payload(
    generator: &mut TradeGenerator,
    rng: &mut impl Rng,
    anomaly_rate: f64,
    previous: &Option<Trade>,
) -> (Trade, &'static str) {
    if let Some(previous) = previous {
        if rng.gen_bool(0.02) {
            return (previous.clone(), "duplicate");
        }
    }
    if rng.gen_bool(anomaly_rate) {
        if rng.gen_bool(0.5) {
            (generator.generate_volume_spike(), "volume_spike")
        } else {
            (generator.generate_price_jump(), "price_jump")
        }
    } else {
        (generator.generate_normal(), "normal")
    }
}

/// Share of generated trades that are anomalous, 0.02 when not given.
fn parse_anomaly_rate(arg: Option<&str>) -> anyhow::Result<f64> {
    let Some(arg) = arg else {
        return Ok(0.02);
    };
    let rate: f64 = arg
        .parse()
        .with_context(|| format!("anomaly_rate is not a number: {}", arg))?;
    anyhow::ensure!(
        (0.0..=1.0).contains(&rate),
        "anomaly_rate must be between 0 and 1, got {}",
        rate
    );
    Ok(rate)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trade_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Trade Producer");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("stock");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(5000);
    let anomaly_rate = parse_anomaly_rate(args.get(4).map(|s| s.as_str()))?;
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(10);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        anomaly_rate = anomaly_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    // Connect to NATS
    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, anomaly_rate, delay_ms).await;
        }
    };

    let mut generator = TradeGenerator::new();
    let mut rng = rand::thread_rng();
    let mut previous: Option<Trade> = None;
    let mut counts: HashMap<&'static str, u64> = HashMap::new();

    info!("Starting to publish {} trades...", count);

    for i in 0..count {
        let (trade, kind) = next_payload(&mut generator, &mut rng, anomaly_rate, &previous);
        *counts.entry(kind).or_insert(0) += 1;

        let payload = serde_json::to_vec(&trade)?;
        client.publish(subject.to_string(), payload.into()).await?;
        previous = Some(trade);

        if (i + 1) % 500 == 0 {
            info!("Published {}/{} trades {:?}", i + 1, count, counts);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    client.flush().await?;
    info!("Completed! Published {} trades {:?}", count, counts);

    Ok(())
}

async fn run_dry_mode(count: u64, anomaly_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = TradeGenerator::new();
    let mut rng = rand::thread_rng();
    let mut previous: Option<Trade> = None;

    for i in 0..count {
        let (trade, kind) = next_payload(&mut generator, &mut rng, anomaly_rate, &previous);

        if kind != "normal" || (i + 1) % 500 == 0 || i == 0 {
            info!("Sample trade {} ({}): {}", i + 1, kind, serde_json::to_string(&trade)?);
        }
        previous = Some(trade);

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
