//! Iteration-patience overfitting detector.

use serde::{Deserialize, Serialize};

/// Outcome of feeding one iteration's metric to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorAction {
    /// The metric improved on the best value so far.
    Improved,
    Continue,
    /// No improvement for more than `patience` iterations.
    Stop,
}

/// Stops training once the tracked metric has not improved for more than
/// `patience` iterations. Disabled when `patience` is `None`.
///
/// The state is serializable so a resumed run stops at the same iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverfittingDetector {
    patience: Option<u32>,
    higher_is_better: bool,
    best_value: Option<f64>,
    best_iteration: u32,
    iteration: u32,
}

impl OverfittingDetector {
    pub fn new(patience: Option<u32>, higher_is_better: bool) -> Self {
        Self {
            patience,
            higher_is_better,
            best_value: None,
            best_iteration: 0,
            iteration: 0,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, false)
    }

    pub fn is_enabled(&self) -> bool {
        self.patience.is_some()
    }

    pub fn best_iteration(&self) -> u32 {
        self.best_iteration
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_value
    }

    fn improves(&self, value: f64) -> bool {
        match self.best_value {
            None => true,
            Some(best) if self.higher_is_better => value > best,
            Some(best) => value < best,
        }
    }

    /// Record the metric of the current iteration.
    pub fn update(&mut self, value: f64) -> DetectorAction {
        let iteration = self.iteration;
        self.iteration += 1;
        if value.is_nan() {
            return DetectorAction::Continue;
        }
        if self.improves(value) {
            self.best_value = Some(value);
            self.best_iteration = iteration;
            return DetectorAction::Improved;
        }
        match self.patience {
            Some(patience) if iteration - self.best_iteration > patience => DetectorAction::Stop,
            _ => DetectorAction::Continue,
        }
    }
}

impl Default for OverfittingDetector {
    fn default() -> Self {
        Self::disabled()
    }
}
