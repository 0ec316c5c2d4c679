//! Sync engine tests against a scripted command runner

mod common;

use common::*;

#[tokio::test]
async fn test_sync_runs_four_commands_in_order() {
    let runner = ScriptedRunner::new().shared();
    let summary = engine(runner.clone()).sync_projects(&strings(&["foo"])).await;

    assert_eq!(runner.runs(), expected_plan("foo"));
    assert_eq!(summary.total_projects, 1);
    assert_eq!(summary.clean_projects, 1);
    assert!(summary.report("foo").unwrap().is_clean());
}

#[tokio::test]
async fn test_failed_update_does_not_stop_later_commands() {
    let runner = ScriptedRunner::new()
        .failing_when("update-downstream --site desktop", 2)
        .shared();

    let summary = engine(runner.clone()).sync_projects(&strings(&["foo"])).await;

    assert_eq!(runner.runs(), expected_plan("foo"));
    let report = summary.report("foo").unwrap();
    assert!(!report.is_clean());
    assert_eq!(report.failed_steps.len(), 1);
    assert!(report.failed_steps[0].contains("status 2"));
    assert_eq!(summary.projects_with_warnings, 1);
}

#[tokio::test]
async fn test_each_project_runs_its_own_sequence() {
    let runner = ScriptedRunner::new().shared();
    let projects = strings(&["alpha", "beta", "gamma"]);

    let summary = engine(runner.clone()).sync_projects(&projects).await;

    assert_eq!(runner.runs().len(), 12);
    for project in &projects {
        assert_eq!(runs_for(&runner.runs(), project), expected_plan(project));
    }
    assert_eq!(summary.clean_projects, 3);
}

#[tokio::test]
async fn test_repeated_sync_repeats_the_same_sequence() {
    let runner = ScriptedRunner::new().shared();
    let engine = engine(runner.clone());

    engine.sync_projects(&strings(&["foo"])).await;
    engine.sync_projects(&strings(&["foo"])).await;

    let mut twice = expected_plan("foo");
    twice.extend(expected_plan("foo"));
    assert_eq!(runner.runs(), twice);
}

#[tokio::test]
async fn test_duplicate_projects_sync_once() {
    let runner = ScriptedRunner::new().shared();

    let summary = engine(runner.clone())
        .sync_projects(&strings(&["a", "b", "a"]))
        .await;

    assert_eq!(summary.total_projects, 2);
    assert_eq!(runs_for(&runner.runs(), "a"), expected_plan("a"));
    assert_eq!(runs_for(&runner.runs(), "b"), expected_plan("b"));
}

#[tokio::test]
async fn test_empty_working_set_runs_nothing() {
    let runner = ScriptedRunner::new().shared();

    let summary = engine(runner.clone()).sync_projects(&[]).await;

    assert_eq!(summary.total_projects, 0);
    assert!(runner.runs().is_empty());
}
