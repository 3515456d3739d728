use ev_tool::{
    DataRecalculation, EvSettings, TaskArena, TaskNode, TimeLogEntry, TimePhasedSchedule,
    Timestamp,
};

const WEEK_MILLIS: i64 = 7 * 24 * 60 * 60 * 1000;

fn ts(weeks: i64) -> Timestamp {
    Timestamp::from_millis(1_500_000_000_000 + weeks * WEEK_MILLIS)
}

fn settings_at(effective: Timestamp) -> EvSettings {
    EvSettings {
        effective_date: Some(effective),
        ..EvSettings::default()
    }
}

fn two_task_project() -> TaskArena {
    let mut arena = TaskArena::new(TaskNode::new("project"));
    arena.add_child(arena.root(), TaskNode::new("design").with_plan_time(200.0));
    arena.add_child(arena.root(), TaskNode::new("build").with_plan_time(400.0));
    arena
}

#[test]
fn plan_dates_interpolate_within_the_schedule() {
    // 600 minutes of work against a 300 minute/week schedule: the first
    // task lands a third of the way into week one, the second at the end
    // of week two (the schedule grows an automatic week to absorb it)
    let mut arena = two_task_project();
    let mut schedule = TimePhasedSchedule::new(ts(0), 300.0);
    let mut calc = DataRecalculation::new(settings_at(ts(1)));
    calc.recalculate(&mut arena, &mut schedule, &[]);

    let design = arena.find_by_full_name("project/design").unwrap();
    let build = arena.find_by_full_name("project/build").unwrap();
    assert_eq!(arena.node(design).cum_plan_value, 200.0);
    assert_eq!(arena.node(build).cum_plan_value, 600.0);

    let expected_design = ts(0).plus_millis(WEEK_MILLIS * 2 / 3);
    assert_eq!(arena.node(design).plan_date, Some(expected_design));
    assert_eq!(arena.node(build).plan_date, Some(ts(2)));

    let root = arena.root();
    assert_eq!(arena.node(root).plan_date, Some(ts(2)));
    assert_eq!(schedule.metrics.plan_date, Some(ts(2)));
    assert_eq!(schedule.metrics.total_plan(), 600.0);
}

#[test]
fn completion_earns_the_planned_value() {
    let mut arena = two_task_project();
    let design = arena.find_by_full_name("project/design").unwrap();
    arena.node_mut(design).date_completed = Some(ts(0).plus_millis(WEEK_MILLIS / 2));

    let mut schedule = TimePhasedSchedule::new(ts(0), 300.0);
    let log = [TimeLogEntry::new(
        "project/design",
        ts(0).plus_millis(WEEK_MILLIS / 2),
        250.0,
    )];
    let mut calc = DataRecalculation::new(settings_at(ts(1)));
    calc.recalculate(&mut arena, &mut schedule, &log);

    assert_eq!(arena.node(design).value_earned, 200.0);
    assert_eq!(schedule.metrics.earned_value(), 200.0);
    assert_eq!(schedule.metrics.actual(), 250.0);
    assert!((schedule.metrics.cost_performance_index() - 0.8).abs() < 1e-9);
    assert!((schedule.metrics.percent_complete() - 200.0 / 600.0).abs() < 1e-9);
}

#[test]
fn incomplete_projects_carry_a_forecast_date() {
    let mut arena = two_task_project();
    let design = arena.find_by_full_name("project/design").unwrap();
    arena.node_mut(design).date_completed = Some(ts(0).plus_millis(WEEK_MILLIS / 2));

    let mut schedule = TimePhasedSchedule::new(ts(0), 300.0);
    let log = [TimeLogEntry::new(
        "project/design",
        ts(0).plus_millis(WEEK_MILLIS / 2),
        400.0,
    )];
    let mut calc = DataRecalculation::new(settings_at(ts(1)));
    calc.recalculate(&mut arena, &mut schedule, &log);

    // overspent so far, so the forecast lands past the plan date
    let forecast = schedule.metrics.forecast_date.expect("forecast date");
    assert!(forecast > ts(2), "forecast {forecast} not past plan");
    // leaf forecasts roll up into the tree
    let build = arena.find_by_full_name("project/build").unwrap();
    assert!(arena.node(build).forecast_date.is_some());
}

#[test]
fn finished_projects_forecast_their_completion_date() {
    let mut arena = two_task_project();
    let design = arena.find_by_full_name("project/design").unwrap();
    let build = arena.find_by_full_name("project/build").unwrap();
    arena.node_mut(design).date_completed = Some(ts(1));
    arena.node_mut(build).date_completed = Some(ts(2).plus_millis(1));

    let mut schedule = TimePhasedSchedule::new(ts(0), 300.0);
    let mut calc = DataRecalculation::new(settings_at(ts(3)));
    calc.recalculate(&mut arena, &mut schedule, &[]);

    assert_eq!(calc.completion_date(), Some(ts(2).plus_millis(1)));
    assert_eq!(schedule.metrics.forecast_date, Some(ts(2).plus_millis(1)));
    // a finished plan pins the effective date to the completion date
    assert_eq!(schedule.effective_date(), Some(ts(2).plus_millis(1)));
}

#[test]
fn tasks_without_planned_time_are_flagged() {
    let mut arena = TaskArena::new(TaskNode::new("project"));
    arena.add_child(arena.root(), TaskNode::new("vague"));
    arena.add_child(arena.root(), TaskNode::new("sized").with_plan_time(100.0));

    let mut schedule = TimePhasedSchedule::new(ts(0), 300.0);
    let mut calc = DataRecalculation::new(settings_at(ts(1)));
    calc.recalculate(&mut arena, &mut schedule, &[]);

    let errors = schedule.metrics.errors.as_ref().expect("errors");
    assert!(
        errors.keys().any(|m| m.contains("planned time")),
        "missing plan-time error in {errors:?}"
    );
}

#[test]
fn impossible_plans_never_complete() {
    let mut schedule = TimePhasedSchedule::new(ts(0), 300.0);
    let date = schedule.get_planned_completion_date(1.0e9, 1.0e9);
    assert!(date.is_never());
}

#[test]
fn user_pruned_subtrees_earn_no_value() {
    let mut arena = two_task_project();
    let build = arena.find_by_full_name("project/build").unwrap();
    arena.node_mut(build).pruning = ev_tool::Pruning::UserPruned;

    let mut schedule = TimePhasedSchedule::new(ts(0), 300.0);
    let mut calc = DataRecalculation::new(settings_at(ts(1)));
    calc.recalculate(&mut arena, &mut schedule, &[]);

    assert_eq!(schedule.metrics.total_plan(), 200.0);
    assert_eq!(calc.ev_leaves().len(), 1);
}
