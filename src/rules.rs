//! Per-symbol rule evaluation: high volume and rapid price change

use crate::config::RulesConfig;
use crate::types::TradeEvent;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Mutable rule state for one symbol, created on first sighting.
#[derive(Debug, Clone)]
pub struct SymbolRuleState {
    pub volume_threshold: f64,
    pub price_change_threshold: f64,
    price_history: VecDeque<f64>,
    history_len: usize,
}

impl SymbolRuleState {
    pub fn new(volume_threshold: f64, price_change_threshold: f64, history_len: usize) -> Self {
        Self {
            volume_threshold,
            price_change_threshold,
            price_history: VecDeque::with_capacity(history_len),
            history_len,
        }
    }

    /// High volume: size strictly above the threshold. Does not touch state.
    pub fn is_high_volume(&self, size: f64) -> bool {
        size > self.volume_threshold
    }

    /// Rapid price change against the last recorded price.
    ///
    /// Always records `price`. The first price for a symbol never fires, and a zero
    /// previous price fails closed.
    pub fn record_price(&mut self, price: f64) -> bool {
        let last_price = self.price_history.back().copied();
        self.push_price(price);

        let Some(last_price) = last_price else {
            return false;
        };
        if last_price == 0.0 {
            return false;
        }

        let change = ((price - last_price) / last_price).abs();
        change.is_finite() && change > self.price_change_threshold
    }

    fn push_price(&mut self, price: f64) {
        self.price_history.push_back(price);
        while self.price_history.len() > self.history_len {
            self.price_history.pop_front();
        }
    }

    /// Recorded prices, oldest first
    pub fn price_history(&self) -> &VecDeque<f64> {
        &self.price_history
    }

    pub fn last_price(&self) -> Option<f64> {
        self.price_history.back().copied()
    }
}

/// Outcome of both rules for a single trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuleVerdict {
    pub high_volume: bool,
    pub rapid_price_change: bool,
}

/// Owns the rule state of every symbol seen so far.
#[derive(Debug)]
pub struct RuleEngine {
    config: RulesConfig,
    symbols: HashMap<String, SymbolRuleState>,
}

impl RuleEngine {
    pub fn new(config: RulesConfig) -> Self {
        Self {
            config,
            symbols: HashMap::new(),
        }
    }

    /// Run both rules against a trade. Both always run; the price change rule
    /// records the trade's price.
    pub fn evaluate(&mut self, trade: &TradeEvent) -> RuleVerdict {
        let config = &self.config;
        let state = self
            .symbols
            .entry(trade.symbol.clone())
            .or_insert_with(|| Self::initial_state(config, &trade.symbol));

        let verdict = RuleVerdict {
            high_volume: state.is_high_volume(trade.size),
            rapid_price_change: state.record_price(trade.price),
        };

        if verdict.high_volume || verdict.rapid_price_change {
            debug!(
                symbol = %trade.symbol,
                sequence = %trade.sequence,
                high_volume = verdict.high_volume,
                rapid_price_change = verdict.rapid_price_change,
                "Rule fired"
            );
        }

        verdict
    }

    fn initial_state(config: &RulesConfig, symbol: &str) -> SymbolRuleState {
        let over = config.overrides.iter().find(|o| o.symbol == symbol);
        SymbolRuleState::new(
            over.and_then(|o| o.volume_threshold)
                .unwrap_or(config.volume_threshold),
            over.and_then(|o| o.price_change_threshold)
                .unwrap_or(config.price_change_threshold),
            config.history_len,
        )
    }

    pub fn symbol_state(&self, symbol: &str) -> Option<&SymbolRuleState> {
        self.symbols.get(symbol)
    }

    /// Number of symbols with state
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(RulesConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SymbolOverride;

    fn trade(seq: i64, symbol: &str, price: f64, size: f64) -> TradeEvent {
        TradeEvent::new(seq, symbol, price, size)
    }

    #[test]
    fn test_volume_threshold_boundary() {
        let mut engine = RuleEngine::default();

        assert!(!engine.evaluate(&trade(1, "X", 10.0, 10_000.0)).high_volume);
        assert!(engine.evaluate(&trade(2, "X", 10.0, 10_001.0)).high_volume);
    }

    #[test]
    fn test_first_sighting_never_fires() {
        let mut engine = RuleEngine::default();

        let verdict = engine.evaluate(&trade(1, "NEW", 1_000_000.0, 1.0));
        assert!(!verdict.rapid_price_change);
        assert_eq!(engine.symbol_state("NEW").unwrap().last_price(), Some(1_000_000.0));
    }

    #[test]
    fn test_price_change_boundary() {
        let mut engine = RuleEngine::default();
        engine.evaluate(&trade(1, "A", 100.0, 1.0));
        assert!(!engine.evaluate(&trade(2, "A", 105.0, 1.0)).rapid_price_change);

        let mut engine = RuleEngine::default();
        engine.evaluate(&trade(1, "B", 100.0, 1.0));
        assert!(engine.evaluate(&trade(2, "B", 105.0001, 1.0)).rapid_price_change);

        let mut engine = RuleEngine::default();
        engine.evaluate(&trade(1, "C", 100.0, 1.0));
        assert!(engine.evaluate(&trade(2, "C", 94.0, 1.0)).rapid_price_change);
    }

    #[test]
    fn test_change_measured_against_last_price() {
        let mut engine = RuleEngine::default();
        engine.evaluate(&trade(1, "X", 100.0, 1.0));
        engine.evaluate(&trade(2, "X", 104.0, 1.0));

        // 108/104 is under 4%, even though 108/100 is 8%
        assert!(!engine.evaluate(&trade(3, "X", 108.0, 1.0)).rapid_price_change);
    }

    #[test]
    fn test_symbols_are_independent() {
        let mut engine = RuleEngine::default();
        engine.evaluate(&trade(1, "X", 100.0, 1.0));

        assert!(!engine.evaluate(&trade(2, "Y", 200.0, 1.0)).rapid_price_change);
        assert_eq!(engine.symbol_count(), 2);
    }

    #[test]
    fn test_zero_last_price_fails_closed() {
        let mut state = SymbolRuleState::new(10_000.0, 0.05, 100);
        assert!(!state.record_price(0.0));
        assert!(!state.record_price(50.0));
        assert_eq!(state.last_price(), Some(50.0));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut engine = RuleEngine::default();
        for i in 0..150 {
            engine.evaluate(&trade(i, "X", 100.0 + i as f64 * 0.01, 1.0));
        }

        let history = engine.symbol_state("X").unwrap().price_history();
        assert_eq!(history.len(), 100);
        assert_eq!(history.front().copied(), Some(100.0 + 50.0 * 0.01));
    }

    #[test]
    fn test_symbol_overrides() {
        let config = RulesConfig {
            overrides: vec![SymbolOverride {
                symbol: "PENNY".to_string(),
                volume_threshold: Some(100.0),
                price_change_threshold: Some(0.5),
            }],
            ..RulesConfig::default()
        };
        let mut engine = RuleEngine::new(config);

        engine.evaluate(&trade(1, "PENNY", 1.0, 1.0));
        let verdict = engine.evaluate(&trade(2, "PENNY", 1.4, 101.0));
        assert!(verdict.high_volume);
        assert!(!verdict.rapid_price_change);

        let other = engine.evaluate(&trade(3, "OTHER", 1.0, 101.0));
        assert!(!other.high_volume);
    }
}
