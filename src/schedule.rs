use crate::dates::{self, Timestamp, WEEK_MILLIS};
use crate::metrics::PerformanceMetrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// Hard cap on schedule growth; a query that cannot be satisfied within
/// this many periods returns the never sentinel instead.
pub const MAX_PERIODS: usize = 300;

/// Default capacity for a freshly created schedule: 20 hours per week.
pub const DEFAULT_WEEKLY_MINUTES: f64 = 20.0 * 60.0;

/// A schedule aliased by several owners (a task list and the rollups that
/// include it). Mutation methods take the lock per call.
pub type SharedSchedule = Arc<Mutex<TimePhasedSchedule>>;

pub fn shared(schedule: TimePhasedSchedule) -> SharedSchedule {
    Arc::new(Mutex::new(schedule))
}

/// One slice of the time-phased ledger.
///
/// The first entry of a schedule is a zero-length boundary marker whose
/// `end_date` is the schedule start; real periods begin at index 1, and a
/// period's begin date is its predecessor's end date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub end_date: Timestamp,
    pub plan_total_time: f64,
    pub plan_direct_time: f64,
    pub cum_plan_direct_time: f64,
    pub cum_plan_value: f64,
    pub actual_direct_time: f64,
    pub actual_indirect_time: f64,
    pub cum_actual_direct_time: f64,
    pub cum_earned_value: f64,
    pub cum_actual_cost: f64,
    pub automatic: bool,

    /// Per-period deltas, derived on demand from the cumulative fields.
    #[serde(skip)]
    pub plan_value: f64,
    #[serde(skip)]
    pub earned_value: f64,
    #[serde(skip)]
    pub actual_cost: f64,
}

impl Period {
    pub fn new(end_date: Timestamp, plan_time: f64) -> Self {
        Self {
            end_date,
            plan_total_time: plan_time,
            plan_direct_time: plan_time,
            cum_plan_direct_time: 0.0,
            cum_plan_value: 0.0,
            actual_direct_time: 0.0,
            actual_indirect_time: 0.0,
            cum_actual_direct_time: 0.0,
            cum_earned_value: 0.0,
            cum_actual_cost: 0.0,
            automatic: false,
            plan_value: 0.0,
            earned_value: 0.0,
            actual_cost: 0.0,
        }
    }
}

/// An ordered, mutable ledger of time periods carrying planned and actual
/// time, value, and cost, with automatic growth past the defined end.
#[derive(Debug, Clone)]
pub struct TimePhasedSchedule {
    periods: Vec<Period>,
    pub metrics: PerformanceMetrics,
    effective_date: Option<Timestamp>,
    effective_period: usize,
    /// Plan time of the last manual period; the rate at which automatic
    /// periods are filled.
    pub(crate) default_plan_total_time: f64,
    pub(crate) default_plan_direct_time: f64,
    /// 1 - level of effort.
    direct_percentage: f64,
}

impl TimePhasedSchedule {
    /// A schedule starting at `start` with one manual period of
    /// `minutes_per_week` capacity.
    pub fn new(start: Timestamp, minutes_per_week: f64) -> Self {
        let mut first_end = start.plus_millis(WEEK_MILLIS);
        first_end = first_end.plus_millis(dates::dst_difference(start, first_end));
        let mut sched = Self {
            periods: vec![Period::new(start, 0.0), Period::new(first_end, minutes_per_week)],
            metrics: PerformanceMetrics::new(),
            effective_date: None,
            effective_period: 0,
            default_plan_total_time: minutes_per_week,
            default_plan_direct_time: minutes_per_week,
            direct_percentage: 1.0,
        };
        sched.recalc_cum_plan_times();
        sched
    }

    pub fn with_default_week(start: Timestamp) -> Self {
        Self::new(start, DEFAULT_WEEKLY_MINUTES)
    }

    /// Rebuild a schedule from saved periods. The list must already be in
    /// chronological order with the boundary entry first.
    pub fn from_periods(periods: Vec<Period>) -> Self {
        let mut periods = periods;
        if periods.is_empty() {
            return Self::with_default_week(Timestamp::now());
        }
        if periods.len() == 1 {
            let start = periods[0].end_date;
            periods.push(Period::new(start.plus_millis(WEEK_MILLIS), 0.0));
        }
        let last = periods.len() - 1;
        let mut sched = Self {
            default_plan_total_time: periods[last].plan_total_time,
            default_plan_direct_time: periods[last].plan_direct_time,
            periods,
            metrics: PerformanceMetrics::new(),
            effective_date: None,
            effective_period: 0,
            direct_percentage: 1.0,
        };
        sched.recalc_cum_plan_times();
        sched.recalc_cum_actual_times();
        sched
    }

    // ---- basic access -------------------------------------------------

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub(crate) fn periods_mut(&mut self) -> &mut Vec<Period> {
        &mut self.periods
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn get(&self, index: usize) -> &Period {
        &self.periods[index]
    }

    pub fn last(&self) -> &Period {
        &self.periods[self.periods.len() - 1]
    }

    pub fn begin_date(&self, index: usize) -> Timestamp {
        if index == 0 {
            Timestamp::LONG_AGO
        } else {
            self.periods[index - 1].end_date
        }
    }

    pub fn start_date(&self) -> Timestamp {
        self.periods[0].end_date
    }

    /// Fraction of period `index` elapsed at `when`: 0 before the period,
    /// 1 after it, linear in between.
    pub fn elapsed_percent(&self, index: usize, when: Timestamp) -> f64 {
        let begin = self.begin_date(index);
        let end = self.periods[index].end_date;
        if when <= begin {
            0.0
        } else if when >= end {
            1.0
        } else {
            (when.millis() - begin.millis()) as f64 / (end.millis() - begin.millis()) as f64
        }
    }

    pub fn period_containing(&self, when: Timestamp) -> Option<usize> {
        (1..self.periods.len()).find(|&i| when >= self.begin_date(i) && when < self.periods[i].end_date)
    }

    // ---- level of effort ----------------------------------------------

    pub fn set_level_of_effort(&mut self, percent: f64) {
        self.direct_percentage = (1.0 - percent).max(0.0);
    }

    pub fn level_of_effort(&self) -> f64 {
        1.0 - self.direct_percentage
    }

    // ---- effective date -----------------------------------------------

    pub fn effective_date(&self) -> Option<Timestamp> {
        self.effective_date
    }

    pub fn set_effective_date(&mut self, date: Timestamp) {
        self.effective_date = Some(date);
        self.effective_period = 0;
        for i in (0..self.periods.len()).rev() {
            if self.periods[i].end_date < date {
                self.effective_period = i + 1;
                return;
            }
        }
    }

    /// Index of the period containing the effective date.
    pub fn effective_period(&self) -> usize {
        self.effective_period
    }

    // ---- structural edits ---------------------------------------------

    /// Append one automatic (or manual) period, spaced like the last two
    /// boundaries in wall-clock terms, carrying the cumulative totals
    /// forward. Refuses past the growth cap.
    pub(crate) fn grow(&mut self, automatic: bool) -> bool {
        let size = self.periods.len();
        if size < 2 || size > MAX_PERIODS {
            return false;
        }
        let x = self.periods[size - 2].end_date;
        let y = self.periods[size - 1].end_date;
        let delta = y.millis() - x.millis() - dates::dst_difference(x, y);
        let mut z_end = y.plus_millis(delta);
        z_end = z_end.plus_millis(dates::dst_difference(y, z_end));

        let prev = &self.periods[size - 1];
        let mut z = Period::new(z_end, 0.0);
        z.cum_plan_direct_time = prev.cum_plan_direct_time;
        z.cum_plan_value = prev.cum_plan_value;
        z.cum_earned_value = prev.cum_earned_value;
        z.cum_actual_cost = prev.cum_actual_cost;
        z.cum_actual_direct_time = prev.cum_actual_direct_time;
        z.automatic = automatic;
        self.periods.push(z);
        true
    }

    /// Bump the final automatic period toward the default rate, up to the
    /// required cumulative plan time. False when nothing could be added.
    fn add_hours(&mut self, required_cum_plan_time: f64) -> bool {
        let size = self.periods.len();
        let prev_cum = self.periods[size - 2].cum_plan_direct_time;
        let z = &mut self.periods[size - 1];

        if !z.automatic {
            return false;
        }
        let diff = self.default_plan_direct_time - z.plan_direct_time;
        if diff <= 0.0 {
            return false;
        }
        let cum_diff = required_cum_plan_time - z.cum_plan_direct_time;
        if cum_diff <= 0.0 {
            return false;
        }

        if diff < cum_diff {
            z.plan_total_time = self.default_plan_total_time;
            z.plan_direct_time = self.default_plan_direct_time;
            z.cum_plan_direct_time = prev_cum + self.default_plan_direct_time;
        } else {
            z.cum_plan_direct_time = required_cum_plan_time;
            z.plan_direct_time = required_cum_plan_time - prev_cum;
            z.plan_total_time =
                z.plan_direct_time * (self.default_plan_total_time / self.default_plan_direct_time);
        }
        true
    }

    /// Materialize the automatic tail as manual periods at the default
    /// rate and add one more.
    pub fn add_row(&mut self) {
        self.grow(true);
        for p in self.periods.iter_mut().rev() {
            if !p.automatic {
                break;
            }
            p.plan_total_time = self.default_plan_total_time;
            p.plan_direct_time = self.default_plan_direct_time;
            p.automatic = false;
        }
        self.recalc_cum_plan_times();
    }

    /// Split period `index` at its midpoint. The later half keeps the
    /// period's times and loses its automatic flag.
    pub fn insert_period(&mut self, index: usize) {
        if index == 0 || index >= self.periods.len() {
            return;
        }
        let begin = self.begin_date(index);
        let end = self.periods[index].end_date;
        let midpoint = Timestamp::from_millis((begin.millis() + end.millis()) / 2);
        self.periods.insert(index, Period::new(midpoint, 0.0));
        self.periods[index + 1].automatic = false;
        self.recalc_cum_plan_times();
    }

    /// Remove a manual period. The boundary entry and automatic periods
    /// cannot be deleted, and at least one real period always remains.
    pub fn delete_period(&mut self, index: usize) {
        if index == 0 || index >= self.periods.len() || self.periods.len() <= 2 {
            return;
        }
        if self.periods[index].automatic {
            return;
        }
        self.periods.remove(index);
        self.recalc_cum_plan_times();
        self.recalc_cum_actual_times();
    }

    /// Move the schedule start to `new_start`, sliding every boundary by
    /// the same wall-clock delta.
    pub fn set_start_date(&mut self, new_start: Timestamp) {
        let old_start = self.start_date();
        if new_start == old_start {
            return;
        }
        let mut delta = new_start.millis() - old_start.millis();
        delta += dates::dst_difference(new_start, old_start);
        self.slide_schedule_dates(delta);
    }

    fn slide_schedule_dates(&mut self, delta: i64) {
        for p in &mut self.periods {
            let current = p.end_date;
            let mut new_end = current.plus_millis(delta);
            new_end = new_end.plus_millis(dates::dst_difference(current, new_end));
            p.end_date = new_end;
        }
    }

    /// Discard the automatic tail and all accumulated actual data, apply
    /// the direct percentage to the plan, and re-derive the default
    /// growth rate from the last manual period.
    pub fn clean_up(&mut self) {
        let len = self.periods.len();
        let mut cut = len;
        for i in 0..len {
            let direct = self.direct_percentage;
            let p = &mut self.periods[i];
            p.plan_direct_time = direct * p.plan_total_time;
            p.cum_plan_value = 0.0;
            p.cum_earned_value = 0.0;
            p.cum_actual_cost = 0.0;
            p.actual_direct_time = 0.0;
            p.actual_indirect_time = 0.0;
            p.cum_actual_direct_time = 0.0;
            if p.automatic {
                cut = i;
                break;
            }
        }
        if cut < 2 {
            cut = 2;
            for p in self.periods.iter_mut().take(2) {
                p.automatic = false;
            }
        }
        self.periods.truncate(cut);
        let last = &self.periods[self.periods.len() - 1];
        self.default_plan_total_time = last.plan_total_time;
        self.default_plan_direct_time = last.plan_direct_time;
        self.recalc_cum_plan_times();
    }

    pub fn recalc_cum_plan_times(&mut self) {
        let mut cum = 0.0;
        for p in &mut self.periods {
            cum += p.plan_direct_time;
            p.cum_plan_direct_time = cum;
        }
    }

    pub fn recalc_cum_actual_times(&mut self) {
        let mut cum = 0.0;
        for p in &mut self.periods {
            cum += p.actual_direct_time;
            p.cum_actual_direct_time = cum;
        }
    }

    /// Fill the per-period delta fields from the cumulative ledger.
    pub fn calc_individual_values(&mut self) {
        let mut prev_pv = 0.0;
        let mut prev_ev = 0.0;
        let mut prev_ac = 0.0;
        for (i, p) in self.periods.iter_mut().enumerate() {
            if i == 0 {
                p.plan_value = p.cum_plan_value;
                p.earned_value = p.cum_earned_value;
                p.actual_cost = p.cum_actual_cost;
            } else {
                p.plan_value = p.cum_plan_value - prev_pv;
                p.earned_value = p.cum_earned_value - prev_ev;
                p.actual_cost = p.cum_actual_cost - prev_ac;
            }
            prev_pv = p.cum_plan_value;
            prev_ev = p.cum_earned_value;
            prev_ac = p.cum_actual_cost;
        }
    }

    /// Scale planned time in every period, e.g. by `1/DTPI` to model
    /// observed schedule performance. Non-finite multipliers are ignored.
    pub fn multiply(&mut self, plan_multiplier: f64) {
        if dates::bad_double(plan_multiplier) {
            return;
        }
        for p in &mut self.periods {
            p.plan_total_time *= plan_multiplier;
            p.plan_direct_time *= plan_multiplier;
        }
        self.default_plan_total_time *= plan_multiplier;
        self.default_plan_direct_time *= plan_multiplier;
        self.recalc_cum_plan_times();
    }

    // ---- time queries --------------------------------------------------

    /// Planned direct time in periods ending before `when`; with
    /// `include_partial`, the in-progress period contributes its elapsed
    /// fraction. Automatic periods count at the rate of the last manual
    /// period before them.
    pub fn scheduled_plan_time(&self, when: Timestamp, include_partial: bool) -> f64 {
        let mut result = 0.0;
        let mut auto_rate = 0.0;
        for i in 0..self.periods.len() {
            let percent = self.elapsed_percent(i, when);
            if percent == 0.0 {
                break;
            }
            if percent < 1.0 && !include_partial {
                break;
            }
            let p = &self.periods[i];
            let period_time = if p.automatic {
                auto_rate
            } else {
                auto_rate = p.plan_direct_time;
                auto_rate
            };
            result += period_time * percent;
        }
        result
    }

    /// Actual direct time in periods ending before `when`.
    pub fn scheduled_actual_time(&self, when: Timestamp, include_partial: bool) -> f64 {
        let mut result = 0.0;
        for i in 0..self.periods.len() {
            if self.begin_date(i) > when {
                break;
            }
            if !include_partial && self.periods[i].end_date > when {
                break;
            }
            result += self.periods[i].actual_direct_time;
        }
        result
    }

    // ---- planned completion -------------------------------------------

    /// The date at which the plan reaches `cum_plan_time` direct minutes.
    /// Every qualifying period's cumulative plan value is raised (by max)
    /// to `cum_plan_value`. Grows the schedule at the default rate when
    /// the defined periods do not suffice; [`Timestamp::NEVER`] when the
    /// schedule cannot absorb the work.
    pub fn get_planned_completion_date(&mut self, cum_plan_time: f64, cum_plan_value: f64) -> Timestamp {
        if dates::bad_double(cum_plan_time) {
            return Timestamp::NEVER;
        }

        let mut result = None;
        for p in self.periods.iter_mut() {
            if p.cum_plan_direct_time >= cum_plan_time {
                p.cum_plan_value = p.cum_plan_value.max(cum_plan_value);
                if result.is_none() {
                    result = Some(p.end_date);
                }
            }
        }
        if let Some(date) = result {
            return date;
        }

        if self.default_plan_direct_time <= 0.0 {
            return Timestamp::NEVER;
        }

        let mut first_time_through = true;
        loop {
            if !first_time_through && !self.grow(true) {
                return Timestamp::NEVER;
            }
            if !self.add_hours(cum_plan_time) && !first_time_through {
                return Timestamp::NEVER;
            }
            let last = self.periods.len() - 1;
            let p = &mut self.periods[last];
            if p.cum_plan_direct_time >= cum_plan_time {
                p.cum_plan_value = p.cum_plan_value.max(cum_plan_value);
                return p.end_date;
            }
            first_time_through = false;
        }
    }

    /// Linear interpolation of the date at which the cumulative plan
    /// reaches `cum_plan_time`, within the period that spans it.
    pub fn extrapolate_within_schedule(&self, cum_plan_time: f64) -> Timestamp {
        if cum_plan_time < 0.0 {
            return Timestamp::LONG_AGO;
        }
        if dates::bad_double(cum_plan_time) {
            return Timestamp::NEVER;
        }

        for i in 1..self.periods.len() {
            let p = &self.periods[i];
            if p.cum_plan_direct_time < cum_plan_time {
                continue;
            }
            let prev_cum = self.periods[i - 1].cum_plan_direct_time;
            let span = p.cum_plan_direct_time - prev_cum;
            let percent = (cum_plan_time - prev_cum) / span;
            let start = self.begin_date(i).millis();
            let duration = p.end_date.millis() - start;
            return Timestamp::from_millis(start + (duration as f64 * percent) as i64);
        }

        Timestamp::NEVER
    }

    /// Side-effect-free what-if: the date this schedule would reach
    /// `cum_plan_time`, optionally correcting future capacity by the
    /// observed direct-time performance. Runs on a private clone.
    pub fn get_hypothetical_date(&self, cum_plan_time: f64, use_dtpi: bool) -> Timestamp {
        let mut s = self.clone();
        s.clean_up();
        if use_dtpi {
            s.multiply(1.0 / self.metrics.direct_time_performance_index_eff());
        }
        let extra = cum_plan_time + s.default_plan_direct_time;
        s.get_planned_completion_date(extra, extra);
        let result = s.extrapolate_within_schedule(cum_plan_time);
        trace!(cum_plan_time, use_dtpi, %result, "hypothetical date");
        result
    }

    // ---- actual data posting ------------------------------------------

    pub fn save_completed_task(&mut self, date_completed: Timestamp, earned_value: f64) {
        self.save_actual_task_info(Some(date_completed), 0.0, earned_value, 0.0, 0.0, true);
    }

    pub fn save_completed_task_cost(&mut self, date_completed: Timestamp, actual_cost: f64) {
        self.save_actual_task_info(Some(date_completed), 0.0, 0.0, 0.0, actual_cost, true);
    }

    pub fn save_actual_time(&mut self, when: Timestamp, actual_time: f64) {
        self.save_actual_task_info(Some(when), 0.0, 0.0, actual_time, 0.0, true);
    }

    pub fn save_actual_indirect_time(&mut self, when: Timestamp, actual_time: f64) {
        self.save_actual_task_info(Some(when), 0.0, 0.0, actual_time, 0.0, false);
    }

    /// Post task activity dated `when` into the ledger: cumulative fields
    /// of every period ending after `when` absorb the direct amounts, and
    /// the period containing `when` records the in-period actual time.
    /// Grows the schedule when the date falls past its end.
    pub fn save_actual_task_info(
        &mut self,
        when: Option<Timestamp>,
        plan_value: f64,
        earned_value: f64,
        actual_time: f64,
        actual_cost: f64,
        direct: bool,
    ) {
        let when = match when {
            Some(w) if !w.is_never() => w,
            _ => return,
        };

        let mut found_date = false;
        for i in (0..self.periods.len()).rev() {
            let begin = self.begin_date(i);
            let p = &mut self.periods[i];
            if when < p.end_date {
                found_date = true;
                if direct {
                    p.cum_plan_value += plan_value;
                    p.cum_earned_value += earned_value;
                    p.cum_actual_direct_time += actual_time;
                    p.cum_actual_cost += actual_cost;
                }
                if when >= begin {
                    if direct {
                        p.actual_direct_time += actual_time;
                    } else {
                        p.actual_indirect_time += actual_time;
                    }
                }
            } else {
                break;
            }
        }
        if found_date {
            return;
        }

        // activity dated past the end of the schedule
        loop {
            if !self.grow(true) {
                return;
            }
            let i = self.periods.len() - 1;
            let begin = self.begin_date(i);
            let p = &mut self.periods[i];
            if when < p.end_date {
                if direct {
                    p.cum_plan_value += plan_value;
                    p.cum_earned_value += earned_value;
                    p.cum_actual_direct_time += actual_time;
                    p.cum_actual_cost += actual_cost;
                }
                if when >= begin {
                    if direct {
                        p.actual_direct_time += actual_time;
                    } else {
                        p.actual_indirect_time += actual_time;
                    }
                }
                return;
            }
        }
    }

    /// Refresh the metrics' schedule-time totals from the ledger.
    pub(crate) fn recalc_metrics_schedule_time(&mut self, use_partial: bool) {
        if let Some(current) = self.metrics.current_date {
            self.metrics.total_schedule_plan_time = self.scheduled_plan_time(current, use_partial);
            self.metrics.total_schedule_actual_time =
                self.scheduled_actual_time(current, use_partial);
        }
    }

    /// `(plan_direct, actual_direct)` pairs for the completed periods, the
    /// raw material of a time-error interval.
    pub fn completed_period_times(&self) -> Vec<(f64, f64)> {
        let cutoff = match self.effective_date {
            Some(d) => d,
            None => return Vec::new(),
        };
        (0..self.periods.len())
            .filter(|&i| self.periods[i].end_date <= cutoff)
            .map(|i| (self.periods[i].plan_direct_time, self.periods[i].actual_direct_time))
            .collect()
    }
}

/// A what-if copy of a schedule whose historical periods are rewritten so
/// the plan curve tracks what actually happened, while future periods keep
/// the plan. The period containing the effective date is split in two at
/// that date. Queries against it answer "given where we really are, when
/// will the remaining plan reach X".
#[derive(Debug, Clone)]
pub struct SplitSchedule {
    sched: TimePhasedSchedule,
    /// Index of the first period after the split point.
    split_index: usize,
}

impl SplitSchedule {
    /// Standard split: historical plan time becomes the actual direct time
    /// recorded in each period.
    pub fn new(src: &TimePhasedSchedule) -> Self {
        Self::with_rewriter(src, |p| {
            p.plan_total_time = p.actual_direct_time + p.actual_indirect_time;
            p.plan_direct_time = p.actual_direct_time;
        })
    }

    /// Split with a custom rewrite of each historical period. The rewriter
    /// sees a copy of the source period with all cumulative fields intact
    /// and must leave its revised plan time in `plan_direct_time`.
    pub fn with_rewriter(
        src: &TimePhasedSchedule,
        mut rewrite: impl FnMut(&mut Period),
    ) -> Self {
        let eff = src.effective_date().unwrap_or_else(|| src.start_date());
        let mut periods = vec![src.get(0).clone()];
        let mut split_index = 1;

        for i in 1..src.len() {
            let begin = src.begin_date(i);
            let p = src.get(i).clone();
            if p.end_date <= eff {
                let mut h = p;
                rewrite(&mut h);
                periods.push(h);
                split_index = periods.len();
            } else if begin < eff {
                let pct = src.elapsed_percent(i, eff);
                let mut past = p.clone();
                past.end_date = eff;
                past.automatic = false;
                rewrite(&mut past);
                periods.push(past);
                split_index = periods.len();

                let mut future = p;
                future.plan_total_time *= 1.0 - pct;
                future.plan_direct_time *= 1.0 - pct;
                future.actual_direct_time = 0.0;
                future.actual_indirect_time = 0.0;
                periods.push(future);
            } else {
                periods.push(p);
            }
        }

        let mut sched = TimePhasedSchedule {
            periods,
            metrics: src.metrics.clone(),
            effective_date: src.effective_date(),
            effective_period: 0,
            default_plan_total_time: src.default_plan_total_time,
            default_plan_direct_time: src.default_plan_direct_time,
            direct_percentage: src.direct_percentage,
        };
        sched.recalc_cum_plan_times();
        sched.recalc_cum_actual_times();
        Self { sched, split_index }
    }

    /// Scale the plan of every period after the split point (and the
    /// default growth rate) by `factor`.
    pub fn scale_future(&mut self, factor: f64) {
        if dates::bad_double(factor) {
            return;
        }
        for p in &mut self.sched.periods[self.split_index..] {
            p.plan_total_time *= factor;
            p.plan_direct_time *= factor;
        }
        self.sched.default_plan_total_time *= factor;
        self.sched.default_plan_direct_time *= factor;
        self.sched.recalc_cum_plan_times();
    }

    /// The date the rewritten plan curve reaches `cum_plan_time`.
    /// `future_multiplier` scales only the periods after the split point,
    /// e.g. `1/DTPI` to model observed schedule performance going forward.
    pub fn hypothetical_date(&self, cum_plan_time: f64, future_multiplier: Option<f64>) -> Timestamp {
        let mut s = self.sched.clone();
        if let Some(factor) = future_multiplier {
            if !dates::bad_double(factor) {
                for p in &mut s.periods[self.split_index..] {
                    p.plan_total_time *= factor;
                    p.plan_direct_time *= factor;
                }
                s.default_plan_total_time *= factor;
                s.default_plan_direct_time *= factor;
                s.recalc_cum_plan_times();
            }
        }
        let extra = cum_plan_time + s.default_plan_direct_time;
        s.get_planned_completion_date(extra, extra);
        s.extrapolate_within_schedule(cum_plan_time)
    }
}
