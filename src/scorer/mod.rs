//! Online outlier scoring of trade prices
//!
//! Every price joins a global training corpus. Whenever the corpus size reaches a
//! multiple of the retrain interval, a fresh Isolation Forest is fit on the whole
//! corpus, z-score normalized with the corpus statistics of that moment. Scoring
//! normalizes with the statistics at scoring time, which keep drifting between
//! refits: the same raw price can get a different verdict later in the stream.
//!
//! In background mode at most one fit runs at a time. A refit triggered while one
//! is running is deferred, and starts on the newest corpus once the running fit
//! has finished.

pub mod forest;

use crate::config::ScorerConfig;
use forest::{ForestParams, IsolationForest};
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle of the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorerPhase {
    /// Fewer than `min_samples` prices seen
    Warming,
    /// Enough prices, but no model has been installed yet
    Unfitted,
    /// A model is installed
    Fitted,
}

/// Running mean and population variance (Welford).
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).max(0.0).sqrt()
        }
    }

    /// Z-score of `x`, or `None` when the spread is zero or not finite.
    pub fn normalize(&self, x: f64) -> Option<f64> {
        let std = self.std_dev();
        if std > 0.0 && std.is_finite() {
            Some((x - self.mean) / std)
        } else {
            None
        }
    }
}

/// A forest together with what it was trained on.
#[derive(Debug)]
pub struct FittedModel {
    pub forest: IsolationForest,
    /// Monotonic refit number, starting at 1
    pub generation: u64,
    /// Corpus size at fit time
    pub trained_on: usize,
}

/// Shared slot holding the latest completed model.
///
/// Readers take an `Arc` snapshot and never wait on a running fit.
#[derive(Debug, Clone, Default)]
pub struct ModelHandle {
    slot: Arc<RwLock<Option<Arc<FittedModel>>>>,
}

impl ModelHandle {
    pub fn current(&self) -> Option<Arc<FittedModel>> {
        self.slot.read().clone()
    }

    /// Install `model` unless an equal or newer generation is already installed.
    pub fn install(&self, model: FittedModel) -> bool {
        let mut slot = self.slot.write();
        if slot
            .as_ref()
            .is_some_and(|current| current.generation >= model.generation)
        {
            return false;
        }
        *slot = Some(Arc::new(model));
        true
    }

    /// Generation of the installed model, 0 if none
    pub fn generation(&self) -> u64 {
        self.slot.read().as_ref().map_or(0, |m| m.generation)
    }
}

/// Accumulates prices, refits the forest on schedule and scores each price.
#[derive(Debug)]
pub struct OutlierScorer {
    samples: Vec<f64>,
    stats: RunningStats,
    params: ForestParams,
    min_samples: usize,
    retrain_interval: usize,
    background: bool,
    model: ModelHandle,
    generation: u64,
    trainer: Option<JoinHandle<()>>,
    refit_pending: bool,
}

impl OutlierScorer {
    pub fn new(config: &ScorerConfig) -> Self {
        Self {
            samples: Vec::new(),
            stats: RunningStats::default(),
            params: ForestParams {
                n_estimators: config.n_estimators,
                max_samples: config.max_samples,
                contamination: config.contamination,
                seed: config.seed,
            },
            min_samples: config.min_samples,
            retrain_interval: config.retrain_interval.max(1),
            background: config.background_retrain,
            model: ModelHandle::default(),
            generation: 0,
            trainer: None,
            refit_pending: false,
        }
    }

    /// Add `price` to the corpus and report whether it is an outlier.
    ///
    /// The price is recorded in every phase. Scoring only happens once a model is
    /// installed, and fails closed when the corpus has zero spread.
    pub fn score(&mut self, price: f64) -> bool {
        self.samples.push(price);
        self.stats.push(price);

        let n = self.samples.len();
        if n < self.min_samples {
            return false;
        }

        self.reap_trainer();
        if n % self.retrain_interval == 0 {
            if self.trainer.is_some() {
                debug!(corpus = n, "Refit already running, deferring");
                self.refit_pending = true;
            } else {
                self.retrain();
            }
        } else if self.refit_pending && self.trainer.is_none() {
            self.retrain();
        }

        let Some(model) = self.model.current() else {
            return false;
        };
        let Some(z) = self.stats.normalize(price) else {
            return false;
        };

        let decision = model.forest.decision_function(z);
        if decision < 0.0 {
            debug!(
                price = price,
                z_score = z,
                decision = decision,
                generation = model.generation,
                "Price scored as outlier"
            );
        }
        decision < 0.0
    }

    /// Join the trainer thread if it has finished.
    fn reap_trainer(&mut self) {
        if self.trainer.as_ref().is_some_and(|handle| handle.is_finished()) {
            self.join_trainer();
        }
    }

    fn join_trainer(&mut self) {
        if let Some(handle) = self.trainer.take() {
            if handle.join().is_err() {
                error!("Trainer thread panicked");
            }
        }
    }

    fn retrain(&mut self) {
        self.refit_pending = false;
        let (mean, std) = (self.stats.mean(), self.stats.std_dev());
        if !(std > 0.0 && std.is_finite()) {
            warn!(
                corpus = self.samples.len(),
                mean = mean,
                "Skipping refit: price corpus has zero spread"
            );
            return;
        }

        self.generation += 1;
        let job = TrainingJob {
            corpus: self.samples.clone(),
            mean,
            std,
            generation: self.generation,
            params: self.params.clone(),
        };

        if !self.background {
            job.run(&self.model);
            return;
        }

        let model = self.model.clone();
        match std::thread::Builder::new()
            .name(format!("forest-trainer-{}", self.generation))
            .spawn(move || job.run(&model))
        {
            Ok(handle) => self.trainer = Some(handle),
            Err(e) => {
                error!(
                    generation = self.generation,
                    error = %e,
                    "Failed to spawn trainer thread, refit skipped"
                );
            }
        }
    }

    /// Block until the running fit and any deferred refit have been installed.
    pub fn wait_for_training(&mut self) {
        self.join_trainer();
        if self.refit_pending {
            self.retrain();
            self.join_trainer();
        }
    }

    /// Whether a background fit is currently running
    pub fn is_training(&self) -> bool {
        self.trainer.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn phase(&self) -> ScorerPhase {
        if self.samples.len() < self.min_samples {
            ScorerPhase::Warming
        } else if self.model.current().is_some() {
            ScorerPhase::Fitted
        } else {
            ScorerPhase::Unfitted
        }
    }

    /// Number of prices in the corpus
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    /// Generation of the model currently used for scoring, 0 if none
    pub fn model_generation(&self) -> u64 {
        self.model.generation()
    }

    /// Refits started so far
    pub fn refits_started(&self) -> u64 {
        self.generation
    }

    pub fn model_handle(&self) -> &ModelHandle {
        &self.model
    }
}

impl Drop for OutlierScorer {
    fn drop(&mut self) {
        self.join_trainer();
    }
}

#[derive(Debug)]
struct TrainingJob {
    corpus: Vec<f64>,
    mean: f64,
    std: f64,
    generation: u64,
    params: ForestParams,
}

impl TrainingJob {
    fn run(self, handle: &ModelHandle) {
        let started = Instant::now();
        let normalized: Vec<f64> = self
            .corpus
            .iter()
            .map(|&x| (x - self.mean) / self.std)
            .collect();

        let Some(forest) = IsolationForest::fit(&normalized, &self.params) else {
            warn!(generation = self.generation, "Refit produced no model");
            return;
        };

        let installed = handle.install(FittedModel {
            forest,
            generation: self.generation,
            trained_on: self.corpus.len(),
        });

        info!(
            generation = self.generation,
            corpus = self.corpus.len(),
            mean = self.mean,
            std_dev = self.std,
            installed = installed,
            fit_ms = started.elapsed().as_millis() as u64,
            "Isolation forest refit"
        );
    }
}
