//! Calibration module.
//!
//! Measures how well each model's stated pick confidence matches how often
//! its picks actually win. Computes calibration curves, Brier scores per
//! category and an over/under-confidence diagnosis.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::storage::Store;
use crate::types::{Pick, PickCategory, PickResult};

/// Below this many resolved picks no diagnosis is attempted.
const MIN_POINTS: usize = 10;

/// Mean gap between stated confidence and realized win rate that still
/// counts as well calibrated.
const TOLERANCE: f64 = 0.05;

// ---------------------------------------------------------------------------
// Calibration data
// ---------------------------------------------------------------------------

/// A single confidence-outcome pair.
#[derive(Debug, Clone)]
pub struct CalibrationPoint {
    pub category: PickCategory,
    /// Stated confidence as a probability, 0-1.
    pub confidence: f64,
    pub won: bool,
}

impl CalibrationPoint {
    /// `None` for unresolved picks.
    pub fn from_pick(pick: &Pick) -> Option<Self> {
        pick.result.map(|result| Self {
            category: pick.category,
            confidence: (pick.confidence / 100.0).clamp(0.0, 1.0),
            won: result == PickResult::Win,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationReport {
    pub total_predictions: usize,
    pub overall_brier: f64,
    pub category_brier: BTreeMap<String, f64>,
    /// One bucket per 10% confidence band.
    pub calibration_curve: Vec<CalibrationBucket>,
    pub diagnosis: CalibrationDiagnosis,
}

/// All picks whose confidence fell in `[bin_start, bin_end)`.
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationBucket {
    pub bin_start: f64,
    pub bin_end: f64,
    pub mean_confidence: f64,
    pub actual_win_rate: f64,
    pub count: usize,
    /// |mean_confidence - actual_win_rate|
    pub deviation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum CalibrationDiagnosis {
    WellCalibrated,
    /// Stated confidence above realized win rate.
    OverConfident,
    UnderConfident,
    InsufficientData,
}

// ---------------------------------------------------------------------------
// Calibrator
// ---------------------------------------------------------------------------

pub struct Calibrator {
    points: Vec<CalibrationPoint>,
    num_bins: usize,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Calibrator {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            num_bins: 10,
        }
    }

    pub fn add_point(&mut self, point: CalibrationPoint) {
        self.points.push(point);
    }

    pub fn add_picks<'a>(&mut self, picks: impl IntoIterator<Item = &'a Pick>) {
        self.points.extend(picks.into_iter().filter_map(CalibrationPoint::from_pick));
    }

    pub fn count(&self) -> usize {
        self.points.len()
    }

    pub fn report(&self) -> CalibrationReport {
        if self.points.is_empty() {
            return CalibrationReport {
                total_predictions: 0,
                overall_brier: 0.0,
                category_brier: BTreeMap::new(),
                calibration_curve: Vec::new(),
                diagnosis: CalibrationDiagnosis::InsufficientData,
            };
        }

        let calibration_curve = self.compute_calibration_curve();
        CalibrationReport {
            total_predictions: self.points.len(),
            overall_brier: brier(self.points.iter()),
            category_brier: self.compute_category_brier(),
            diagnosis: self.diagnose(&calibration_curve),
            calibration_curve,
        }
    }

    fn compute_category_brier(&self) -> BTreeMap<String, f64> {
        let mut by_category: BTreeMap<String, Vec<&CalibrationPoint>> = BTreeMap::new();
        for p in &self.points {
            by_category.entry(p.category.to_string()).or_default().push(p);
        }
        by_category
            .into_iter()
            .map(|(cat, points)| (cat, brier(points.into_iter())))
            .collect()
    }

    fn compute_calibration_curve(&self) -> Vec<CalibrationBucket> {
        let bin_width = 1.0 / self.num_bins as f64;
        let last = self.num_bins - 1;

        (0..self.num_bins)
            .map(|i| {
                let bin_start = i as f64 * bin_width;
                let bin_end = bin_start + bin_width;
                let in_bin: Vec<&CalibrationPoint> = self
                    .points
                    .iter()
                    .filter(|p| {
                        p.confidence >= bin_start && (p.confidence < bin_end || (i == last && p.confidence <= 1.0))
                    })
                    .collect();

                let count = in_bin.len();
                if count == 0 {
                    return CalibrationBucket {
                        bin_start,
                        bin_end,
                        mean_confidence: (bin_start + bin_end) / 2.0,
                        actual_win_rate: 0.0,
                        count: 0,
                        deviation: 0.0,
                    };
                }

                let mean_confidence = in_bin.iter().map(|p| p.confidence).sum::<f64>() / count as f64;
                let actual_win_rate = in_bin.iter().filter(|p| p.won).count() as f64 / count as f64;
                CalibrationBucket {
                    bin_start,
                    bin_end,
                    mean_confidence,
                    actual_win_rate,
                    count,
                    deviation: (mean_confidence - actual_win_rate).abs(),
                }
            })
            .collect()
    }

    /// Count-weighted signed gap between stated confidence and win rate.
    fn diagnose(&self, curve: &[CalibrationBucket]) -> CalibrationDiagnosis {
        if self.points.len() < MIN_POINTS {
            return CalibrationDiagnosis::InsufficientData;
        }

        let total: usize = curve.iter().map(|b| b.count).sum();
        let gap = curve
            .iter()
            .filter(|b| b.count > 0)
            .map(|b| (b.mean_confidence - b.actual_win_rate) * b.count as f64)
            .sum::<f64>()
            / total.max(1) as f64;

        if gap > TOLERANCE {
            CalibrationDiagnosis::OverConfident
        } else if gap < -TOLERANCE {
            CalibrationDiagnosis::UnderConfident
        } else {
            CalibrationDiagnosis::WellCalibrated
        }
    }
}

/// Brier = (1/N) * Σ(confidence - outcome)². 0.0 is perfect.
fn brier<'a>(points: impl Iterator<Item = &'a CalibrationPoint>) -> f64 {
    let (sum, n) = points.fold((0.0, 0usize), |(sum, n), p| {
        let outcome = if p.won { 1.0 } else { 0.0 };
        (sum + (p.confidence - outcome).powi(2), n + 1)
    });
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelCalibration {
    pub model_id: String,
    pub display_name: String,
    #[serde(flatten)]
    pub report: CalibrationReport,
}

/// Calibration report for every registered model.
pub async fn calibrate_all(store: &Store) -> Result<Vec<ModelCalibration>> {
    let models = store.list_models().await?;
    let mut out = Vec::with_capacity(models.len());
    for model in models {
        let picks = store.resolved_picks_for_model(&model.id).await?;
        let mut calibrator = Calibrator::new();
        calibrator.add_picks(&picks);
        out.push(ModelCalibration {
            model_id: model.id,
            display_name: model.display_name,
            report: calibrator.report(),
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
