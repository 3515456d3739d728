//! Statistical estimators backing forecast ranges.
//!
//! Every provider yields a central prediction, percentile bounds, and a
//! self-reported viability score. Callers discard (rather than degrade)
//! any interval whose viability is at or below [`ACCEPTABLE`].

use rand::Rng;
use rand::rngs::StdRng;
use std::fmt::Debug;

/// Viability score meaning the estimator could not produce an interval.
pub const CANNOT_CALCULATE: f64 = -1.0;
/// Threshold score: intervals at or below this are statistically unusable.
pub const ACCEPTABLE: f64 = 0.0;
/// Score for a well-conditioned interval.
pub const NOMINAL: f64 = 5.0;

/// A plausible range around a forecast quantity.
///
/// `lpi(p)` / `upi(p)` are the lower and upper bounds of the central
/// interval covering probability `p`; the engine queries them at 0.70.
pub trait ConfidenceInterval: Debug + Send {
    /// Central estimate of the quantity.
    fn prediction(&self) -> f64;

    /// Quantile of the underlying distribution, `p` in (0, 1).
    fn quantile(&self, p: f64) -> f64;

    fn lpi(&self, probability: f64) -> f64 {
        self.quantile((1.0 - probability) / 2.0)
    }

    fn upi(&self, probability: f64) -> f64 {
        self.quantile(1.0 - (1.0 - probability) / 2.0)
    }

    fn viability(&self) -> f64;

    /// Re-judge viability against an externally computed target: when the
    /// target falls outside the central `probability` interval, the
    /// estimator no longer describes reality and marks itself unusable.
    fn retarget(&mut self, _target: f64, _probability: f64) {}

    /// For ratio-based estimators, the observed actual-vs-plan ratio.
    fn actual_vs_plan_ratio(&self) -> Option<f64> {
        None
    }

    /// Draw one plausible value, for Monte-Carlo resampling.
    fn random_value(&self, rng: &mut StdRng) -> f64;

    fn clone_box(&self) -> Box<dyn ConfidenceInterval>;
}

impl Clone for Box<dyn ConfidenceInterval> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// One completed task's contribution to a cost estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub plan: f64,
    pub actual: f64,
}

impl DataPoint {
    pub fn new(plan: f64, actual: f64) -> Self {
        Self { plan, actual }
    }
}

/// Inverse CDF of the standard normal distribution (Acklam's rational
/// approximation, |error| < 1.15e-9).
pub(crate) fn normal_inv_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if !(0.0..=1.0).contains(&p) || p == 0.0 || p == 1.0 {
        return f64::NAN;
    }
    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

fn standard_normal(rng: &mut StdRng) -> f64 {
    // Box-Muller
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn retargeted_viability(base: f64, prediction: f64, std_dev: f64, target: f64, probability: f64) -> f64 {
    if target.is_nan() || target.is_infinite() {
        return base;
    }
    if std_dev <= 0.0 {
        return if (target - prediction).abs() < 1e-9 { base } else { CANNOT_CALCULATE };
    }
    let half_width = normal_inv_cdf(1.0 - (1.0 - probability) / 2.0) * std_dev;
    if (target - prediction).abs() > half_width {
        CANNOT_CALCULATE
    } else {
        base
    }
}

/// Cost estimator fit to the completed tasks of the current plan: the
/// observed actual-vs-plan ratio, with residual spread scaled to the
/// amount of incomplete planned work being forecast.
#[derive(Debug, Clone)]
pub struct LinearRatioInterval {
    prediction: f64,
    std_dev: f64,
    ratio: f64,
    viability: f64,
}

impl LinearRatioInterval {
    /// `input` is the total planned time of the not-yet-completed tasks;
    /// the interval predicts their total cost.
    pub fn from_points(points: &[DataPoint], input: f64) -> Self {
        let usable: Vec<&DataPoint> = points.iter().filter(|p| p.plan > 0.0 || p.actual > 0.0).collect();
        let n = usable.len();
        let plan_sum: f64 = usable.iter().map(|p| p.plan).sum();
        let actual_sum: f64 = usable.iter().map(|p| p.actual).sum();

        if n < 3 || plan_sum <= 0.0 || input.is_nan() || input.is_infinite() {
            return Self {
                prediction: f64::NAN,
                std_dev: f64::NAN,
                ratio: f64::NAN,
                viability: CANNOT_CALCULATE,
            };
        }

        let ratio = actual_sum / plan_sum;
        // residual variance of actuals around the fitted ratio, weighted by
        // plan size so large tasks dominate the spread estimate
        let mut sq_err = 0.0;
        for p in &usable {
            let resid = p.actual - ratio * p.plan;
            sq_err += resid * resid;
        }
        let per_point_var = sq_err / (n as f64 - 1.0);
        // forecasting `input` worth of plan time scales the variance by the
        // ratio of forecast size to observed size
        let scale = if plan_sum > 0.0 { input / plan_sum } else { 1.0 };
        let std_dev = (per_point_var * scale.max(1.0)).sqrt();

        let prediction = input * ratio;
        let spread = if prediction.abs() > 0.0 { std_dev / prediction.abs() } else { f64::INFINITY };
        let viability = if spread.is_finite() && spread < 2.0 { NOMINAL } else { ACCEPTABLE };

        Self { prediction, std_dev, ratio, viability }
    }
}

impl ConfidenceInterval for LinearRatioInterval {
    fn prediction(&self) -> f64 {
        self.prediction
    }

    fn quantile(&self, p: f64) -> f64 {
        self.prediction + self.std_dev * normal_inv_cdf(p)
    }

    fn viability(&self) -> f64 {
        self.viability
    }

    fn retarget(&mut self, target: f64, probability: f64) {
        self.viability =
            retargeted_viability(self.viability, self.prediction, self.std_dev, target, probability);
    }

    fn actual_vs_plan_ratio(&self) -> Option<f64> {
        if self.ratio.is_finite() { Some(self.ratio) } else { None }
    }

    fn random_value(&self, rng: &mut StdRng) -> f64 {
        self.prediction + self.std_dev * standard_normal(rng)
    }

    fn clone_box(&self) -> Box<dyn ConfidenceInterval> {
        Box::new(self.clone())
    }
}

/// Estimator over historical cost ratios, working in log space so that
/// over- and under-estimation are treated symmetrically. Supports
/// recentering around a new ratio when historical bias should be removed.
#[derive(Debug, Clone)]
pub struct LogCenteredInterval {
    log_center: f64,
    log_std_dev: f64,
    input: f64,
    viability: f64,
}

impl LogCenteredInterval {
    /// `ratios` are historical actual/plan ratios; `input` is the planned
    /// quantity being forecast.
    pub fn from_ratios(ratios: &[f64], input: f64) -> Self {
        let logs: Vec<f64> = ratios
            .iter()
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
            .map(f64::ln)
            .collect();
        if logs.len() < 3 || input.is_nan() || input.is_infinite() || input <= 0.0 {
            return Self {
                log_center: f64::NAN,
                log_std_dev: f64::NAN,
                input,
                viability: CANNOT_CALCULATE,
            };
        }
        let mean = logs.iter().sum::<f64>() / logs.len() as f64;
        let var = logs.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / (logs.len() as f64 - 1.0);
        Self {
            log_center: mean,
            log_std_dev: var.sqrt(),
            input,
            viability: NOMINAL,
        }
    }

    /// Multiply the center ratio by `factor` (e.g. `1/cpi` to re-anchor a
    /// historical interval on the current plan's performance).
    pub fn recenter(&mut self, factor: f64) {
        if factor.is_finite() && factor > 0.0 && self.viability > CANNOT_CALCULATE {
            self.log_center += factor.ln();
        }
    }
}

impl ConfidenceInterval for LogCenteredInterval {
    fn prediction(&self) -> f64 {
        self.input * self.log_center.exp()
    }

    fn quantile(&self, p: f64) -> f64 {
        self.input * (self.log_center + self.log_std_dev * normal_inv_cdf(p)).exp()
    }

    fn viability(&self) -> f64 {
        self.viability
    }

    fn actual_vs_plan_ratio(&self) -> Option<f64> {
        if self.log_center.is_finite() { Some(self.log_center.exp()) } else { None }
    }

    fn random_value(&self, rng: &mut StdRng) -> f64 {
        self.input * (self.log_center + self.log_std_dev * standard_normal(rng)).exp()
    }

    fn clone_box(&self) -> Box<dyn ConfidenceInterval> {
        Box::new(self.clone())
    }
}

/// Per-period direct-time error: the distribution of the ratio of actual
/// to planned direct time over completed schedule periods.
#[derive(Debug, Clone)]
pub struct TimeErrInterval {
    center: f64,
    std_dev: f64,
    ratio: f64,
    viability: f64,
}

impl TimeErrInterval {
    /// `periods` holds `(plan_direct, actual_direct)` pairs for completed
    /// periods. With `recenter`, bias is removed so the center ratio is 1;
    /// wide intervals matter little for rollups, bias matters a lot.
    pub fn from_periods(periods: &[(f64, f64)], recenter: bool) -> Self {
        let usable: Vec<&(f64, f64)> = periods.iter().filter(|(p, _)| *p > 0.0).collect();
        let plan_sum: f64 = usable.iter().map(|(p, _)| p).sum();
        let actual_sum: f64 = usable.iter().map(|(_, a)| a).sum();
        if usable.len() < 3 || plan_sum <= 0.0 {
            return Self {
                center: f64::NAN,
                std_dev: f64::NAN,
                ratio: f64::NAN,
                viability: CANNOT_CALCULATE,
            };
        }
        let ratio = actual_sum / plan_sum;
        let ratios: Vec<f64> = usable.iter().map(|(p, a)| a / p).collect();
        let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
        let var = ratios.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (ratios.len() as f64 - 1.0);
        Self {
            center: if recenter { ratio } else { mean },
            std_dev: var.sqrt(),
            ratio,
            viability: NOMINAL,
        }
    }
}

impl ConfidenceInterval for TimeErrInterval {
    fn prediction(&self) -> f64 {
        self.center
    }

    fn quantile(&self, p: f64) -> f64 {
        self.center + self.std_dev * normal_inv_cdf(p)
    }

    fn viability(&self) -> f64 {
        self.viability
    }

    fn retarget(&mut self, target: f64, probability: f64) {
        self.viability =
            retargeted_viability(self.viability, self.center, self.std_dev, target, probability);
    }

    fn actual_vs_plan_ratio(&self) -> Option<f64> {
        if self.ratio.is_finite() { Some(self.ratio) } else { None }
    }

    fn random_value(&self, rng: &mut StdRng) -> f64 {
        (self.center + self.std_dev * standard_normal(rng)).max(0.0)
    }

    fn clone_box(&self) -> Box<dyn ConfidenceInterval> {
        Box::new(self.clone())
    }
}

/// Sum of independent child intervals: predictions add, variances add.
#[derive(Debug, Clone)]
pub struct IntervalSum {
    prediction: f64,
    variance: f64,
    acceptable_error: f64,
    viability: f64,
    complete: bool,
}

impl IntervalSum {
    /// `acceptable_error` widens every child by a floor spread, so a child
    /// claiming perfect knowledge cannot collapse the whole sum.
    pub fn new(acceptable_error: f64) -> Self {
        Self {
            prediction: 0.0,
            variance: 0.0,
            acceptable_error,
            viability: CANNOT_CALCULATE,
            complete: false,
        }
    }

    pub fn add_interval(&mut self, interval: &dyn ConfidenceInterval) {
        let half = (interval.upi(0.70) - interval.lpi(0.70)) / 2.0;
        let z = normal_inv_cdf(0.85);
        let mut std_dev = if z > 0.0 { half / z } else { 0.0 };
        if !std_dev.is_finite() || std_dev < self.acceptable_error {
            std_dev = self.acceptable_error;
        }
        self.prediction += interval.prediction();
        self.variance += std_dev * std_dev;
    }

    pub fn intervals_complete(&mut self) {
        self.complete = true;
        self.viability = if self.prediction.is_finite() && self.variance.is_finite() {
            NOMINAL
        } else {
            CANNOT_CALCULATE
        };
    }
}

impl ConfidenceInterval for IntervalSum {
    fn prediction(&self) -> f64 {
        self.prediction
    }

    fn quantile(&self, p: f64) -> f64 {
        self.prediction + self.variance.sqrt() * normal_inv_cdf(p)
    }

    fn viability(&self) -> f64 {
        if self.complete { self.viability } else { CANNOT_CALCULATE }
    }

    fn random_value(&self, rng: &mut StdRng) -> f64 {
        self.prediction + self.variance.sqrt() * standard_normal(rng)
    }

    fn clone_box(&self) -> Box<dyn ConfidenceInterval> {
        Box::new(self.clone())
    }
}

/// Interval over an empirical sample set, e.g. the completion dates
/// produced by Monte-Carlo trials. Quantiles interpolate between order
/// statistics.
#[derive(Debug, Clone)]
pub struct SampledInterval {
    samples: Vec<f64>,
    viability: f64,
}

impl SampledInterval {
    pub fn from_samples(mut samples: Vec<f64>) -> Self {
        samples.retain(|s| s.is_finite());
        samples.sort_by(|a, b| a.total_cmp(b));
        let viability = if samples.len() < 10 { CANNOT_CALCULATE } else { NOMINAL };
        Self { samples, viability }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl ConfidenceInterval for SampledInterval {
    fn prediction(&self) -> f64 {
        self.quantile(0.5)
    }

    fn quantile(&self, p: f64) -> f64 {
        if self.samples.is_empty() {
            return f64::NAN;
        }
        let rank = p * (self.samples.len() - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        let frac = rank - lo as f64;
        self.samples[lo] * (1.0 - frac) + self.samples[hi] * frac
    }

    fn viability(&self) -> f64 {
        self.viability
    }

    fn retarget(&mut self, target: f64, _probability: f64) {
        // an empirical distribution that never saw anything near the target
        // is not describing the same process
        if self.samples.is_empty() {
            return;
        }
        if target.is_finite()
            && (target < self.quantile(0.01) || target > self.quantile(0.99))
        {
            self.viability = CANNOT_CALCULATE;
        }
    }

    fn random_value(&self, rng: &mut StdRng) -> f64 {
        self.quantile(rng.gen_range(0.0..1.0))
    }

    fn clone_box(&self) -> Box<dyn ConfidenceInterval> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn normal_inverse_is_symmetric() {
        assert!((normal_inv_cdf(0.5)).abs() < 1e-9);
        assert!((normal_inv_cdf(0.85) + normal_inv_cdf(0.15)).abs() < 1e-9);
        assert!((normal_inv_cdf(0.975) - 1.959964).abs() < 1e-4);
    }

    #[test]
    fn linear_ratio_tracks_observed_overrun() {
        let points = vec![
            DataPoint::new(100.0, 120.0),
            DataPoint::new(50.0, 60.0),
            DataPoint::new(200.0, 240.0),
        ];
        let ci = LinearRatioInterval::from_points(&points, 400.0);
        assert!(ci.viability() > ACCEPTABLE);
        assert!((ci.prediction() - 480.0).abs() < 1e-6);
        assert_eq!(ci.actual_vs_plan_ratio(), Some(1.2));
        assert!(ci.lpi(0.70) <= ci.prediction());
        assert!(ci.upi(0.70) >= ci.prediction());
    }

    #[test]
    fn too_few_points_cannot_calculate() {
        let points = vec![DataPoint::new(100.0, 90.0)];
        let ci = LinearRatioInterval::from_points(&points, 100.0);
        assert_eq!(ci.viability(), CANNOT_CALCULATE);
    }

    #[test]
    fn retarget_far_from_prediction_kills_viability() {
        let points = vec![
            DataPoint::new(100.0, 100.0),
            DataPoint::new(100.0, 101.0),
            DataPoint::new(100.0, 99.0),
        ];
        let mut ci = LinearRatioInterval::from_points(&points, 300.0);
        assert!(ci.viability() > ACCEPTABLE);
        ci.retarget(90_000.0, 0.7);
        assert_eq!(ci.viability(), CANNOT_CALCULATE);
    }

    #[test]
    fn sampled_interval_quantiles_interpolate() {
        let ci = SampledInterval::from_samples((0..=100).map(f64::from).collect());
        assert!((ci.quantile(0.5) - 50.0).abs() < 1e-9);
        assert!((ci.lpi(0.70) - 15.0).abs() < 1e-9);
        assert!((ci.upi(0.70) - 85.0).abs() < 1e-9);
    }

    #[test]
    fn interval_sum_adds_predictions() {
        let a = SampledInterval::from_samples((0..50).map(|i| 100.0 + i as f64).collect());
        let b = SampledInterval::from_samples((0..50).map(|i| 200.0 + i as f64).collect());
        let mut sum = IntervalSum::new(5.0 * 60.0);
        sum.add_interval(&a);
        sum.add_interval(&b);
        sum.intervals_complete();
        assert!(sum.viability() > ACCEPTABLE);
        let expected = a.prediction() + b.prediction();
        assert!((sum.prediction() - expected).abs() < 1e-9);
    }

    #[test]
    fn random_values_stay_plausible() {
        let mut rng = StdRng::seed_from_u64(7);
        let points = vec![
            DataPoint::new(100.0, 110.0),
            DataPoint::new(100.0, 120.0),
            DataPoint::new(100.0, 130.0),
            DataPoint::new(100.0, 115.0),
        ];
        let ci = LinearRatioInterval::from_points(&points, 400.0);
        for _ in 0..100 {
            let v = ci.random_value(&mut rng);
            assert!(v.is_finite());
        }
    }
}
