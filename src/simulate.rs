//! Randomized completion-date estimation.
//!
//! The analytic intervals answer "how much will the remaining work cost"
//! and "how far off has the schedule been, period by period". Neither
//! answers "when will it all be done" directly, because the completion
//! date depends on both at once. These routines resample the two source
//! distributions many times, replay each draw through a what-if copy of
//! the schedule, and hand the resulting dates to a [`SampledInterval`].

use crate::confidence::{ACCEPTABLE, ConfidenceInterval, SampledInterval};
use crate::dates::Timestamp;
use crate::schedule::{SplitSchedule, TimePhasedSchedule};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

/// Sample the completion-date distribution of one schedule. Each trial
/// draws a remaining cost and a schedule error ratio, then asks the
/// split schedule when the resampled plan reaches the total.
pub fn forecast_date_interval(
    schedule: &TimePhasedSchedule,
    trials: usize,
    seed: u64,
) -> Option<SampledInterval> {
    let metrics = &schedule.metrics;
    let cost = usable(&metrics.cost_interval)?;
    let time_err = usable(&metrics.time_err_interval)?;

    let split = SplitSchedule::new(schedule);
    let actual = metrics.actual();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut samples = Vec::with_capacity(trials);
    for _ in 0..trials {
        let remaining = cost.random_value(&mut rng).max(0.0);
        let ratio = time_err.random_value(&mut rng);
        samples.push(date_sample(trial_date(&split, actual + remaining, ratio)));
    }
    debug!(trials, "sampled completion dates");
    Some(SampledInterval::from_samples(samples))
}

/// The three distributions a rollup needs: total remaining cost, the
/// plain forecast date (children finish their own schedules, the latest
/// one governs), and the optimized date (the combined team works the
/// total remaining cost off the merged schedule).
#[derive(Debug)]
pub struct RollupSamples {
    pub cost_interval: SampledInterval,
    pub forecast_date_interval: SampledInterval,
    pub optimized_date_interval: SampledInterval,
}

pub fn rollup_intervals(
    children: &[&TimePhasedSchedule],
    rollup: &TimePhasedSchedule,
    trials: usize,
    seed: u64,
) -> Option<RollupSamples> {
    struct ChildDraw<'a> {
        cost: &'a dyn ConfidenceInterval,
        time_err: &'a dyn ConfidenceInterval,
        split: SplitSchedule,
        actual: f64,
        weight: f64,
    }

    let mut draws = Vec::with_capacity(children.len());
    for child in children {
        draws.push(ChildDraw {
            cost: usable(&child.metrics.cost_interval)?,
            time_err: usable(&child.metrics.time_err_interval)?,
            split: SplitSchedule::new(child),
            actual: child.metrics.actual(),
            weight: child.metrics.total_plan().max(1.0),
        });
    }
    if draws.is_empty() {
        return None;
    }

    let rollup_split = SplitSchedule::new(rollup);
    let rollup_actual = rollup.metrics.actual();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut cost_samples = Vec::with_capacity(trials);
    let mut date_samples = Vec::with_capacity(trials);
    let mut optimized_samples = Vec::with_capacity(trials);

    for _ in 0..trials {
        let mut total_remaining = 0.0;
        let mut latest: Option<Timestamp> = None;
        let mut ratio_sum = 0.0;
        let mut weight_sum = 0.0;
        for draw in &draws {
            let remaining = draw.cost.random_value(&mut rng).max(0.0);
            let ratio = draw.time_err.random_value(&mut rng);
            let date = trial_date(&draw.split, draw.actual + remaining, ratio);
            latest = Some(latest.map_or(date, |l| l.max(date)));
            total_remaining += remaining;
            ratio_sum += ratio * draw.weight;
            weight_sum += draw.weight;
        }
        // the merged team's error ratio, weighted by each child's size
        let rollup_ratio = ratio_sum / weight_sum;
        let optimized = trial_date(&rollup_split, rollup_actual + total_remaining, rollup_ratio);

        cost_samples.push(total_remaining);
        date_samples.push(date_sample(latest.unwrap_or(Timestamp::NEVER)));
        optimized_samples.push(date_sample(optimized));
    }
    debug!(trials, children = draws.len(), "sampled rollup completion dates");

    Some(RollupSamples {
        cost_interval: SampledInterval::from_samples(cost_samples),
        forecast_date_interval: SampledInterval::from_samples(date_samples),
        optimized_date_interval: SampledInterval::from_samples(optimized_samples),
    })
}

fn usable(interval: &Option<Box<dyn ConfidenceInterval>>) -> Option<&dyn ConfidenceInterval> {
    interval
        .as_deref()
        .filter(|i| i.viability() > ACCEPTABLE)
}

fn trial_date(split: &SplitSchedule, cum_cost: f64, error_ratio: f64) -> Timestamp {
    let multiplier = if error_ratio > 0.0 && error_ratio.is_finite() {
        Some(1.0 / error_ratio)
    } else {
        None
    };
    split.hypothetical_date(cum_cost, multiplier)
}

fn date_sample(date: Timestamp) -> f64 {
    date.millis() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::{DataPoint, LinearRatioInterval, TimeErrInterval};
    use crate::dates::WEEK_MILLIS;

    fn ts(weeks: i64) -> Timestamp {
        Timestamp::from_millis(1_500_000_000_000 + weeks * WEEK_MILLIS)
    }

    fn live_schedule() -> TimePhasedSchedule {
        let mut s = TimePhasedSchedule::new(ts(0), 600.0);
        for _ in 0..5 {
            s.add_row();
        }
        s.set_effective_date(ts(3));
        for week in 0..3 {
            s.save_actual_time(ts(week).plus_millis(WEEK_MILLIS / 2), 550.0);
        }
        s.recalc_cum_plan_times();
        s.recalc_cum_actual_times();
        s.metrics.reset(Some(ts(0)), ts(3), Some(ts(2)), Some(ts(3)));
        s.metrics.total_plan_time = 3600.0;
        s.metrics.earned_value_time = 1500.0;
        s.metrics.actual_time = 1650.0;

        let points: Vec<DataPoint> = (0..6)
            .map(|i| DataPoint::new(100.0 + i as f64, 110.0 + i as f64))
            .collect();
        s.metrics.cost_interval = Some(Box::new(LinearRatioInterval::from_points(&points, 2100.0)));
        let periods: Vec<(f64, f64)> = (0..4).map(|_| (600.0, 550.0)).collect();
        s.metrics.time_err_interval = Some(Box::new(TimeErrInterval::from_periods(&periods, false)));
        s
    }

    #[test]
    fn same_seed_reproduces_the_interval() {
        let schedule = live_schedule();
        let a = forecast_date_interval(&schedule, 50, 7).expect("interval");
        let b = forecast_date_interval(&schedule, 50, 7).expect("interval");
        assert_eq!(a.prediction(), b.prediction());
        assert_eq!(a.quantile(0.85), b.quantile(0.85));
    }

    #[test]
    fn sampled_dates_fall_after_the_elapsed_schedule() {
        let schedule = live_schedule();
        let interval = forecast_date_interval(&schedule, 100, 3).expect("interval");
        // over 2000 minutes remain at ~600/week: completion is weeks away
        assert!(interval.quantile(0.1) > ts(3).millis() as f64);
    }

    #[test]
    fn missing_source_interval_yields_nothing() {
        let mut schedule = live_schedule();
        schedule.metrics.cost_interval = None;
        assert!(forecast_date_interval(&schedule, 50, 1).is_none());
    }

    #[test]
    fn rollup_cost_samples_sum_the_children() {
        let a = live_schedule();
        let b = live_schedule();
        let rollup = live_schedule();
        let samples = rollup_intervals(&[&a, &b], &rollup, 60, 11).expect("samples");
        // each child owes roughly 2100 more minutes
        let predicted = samples.cost_interval.prediction();
        assert!(predicted > 3000.0 && predicted < 6000.0, "got {predicted}");
        assert!(samples.forecast_date_interval.prediction() > ts(3).millis() as f64);
        assert!(samples.optimized_date_interval.prediction() > ts(3).millis() as f64);
    }
}
