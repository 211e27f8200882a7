//! Integration tests for cherry-picking onto the insertion branch.
//!
//! The fake service answers successive cherry-pick polls from a scripted
//! status sequence, so the tests can count polls and pauses exactly.

mod common;

use common::prelude::*;

use insertion_tool::phases::{Insertion, InsertionState};
use insertion_tool::services::{OperationStatus, NULL_OBJECT_ID};
use std::time::Duration;

fn service(statuses: &[OperationStatus]) -> FakeService {
    FakeService::new()
        .with_file(DEFAULT_CONFIG_PATH, &pins(&[("Foo", "1.0.0")]))
        .with_cherry_pick_statuses(statuses)
}

#[test]
fn test_completed_cherry_pick_moves_branch_after_three_polls() {
    let artifacts = ArtifactsFixture::new().with_package("Foo.1.1.0.nupkg");
    let options = options(artifacts.path(), "cherry-pick: [abc123]\npoll-interval-secs: 2\n");
    let service = service(&[
        OperationStatus::Queued,
        OperationStatus::InProgress,
        OperationStatus::Completed,
    ]);
    let sleeper = RecordingSleeper::new();

    let outcome = Insertion::new(&options, &service, Some(&service))
        .with_sleeper(&sleeper)
        .run();

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.final_state, InsertionState::Success);
    assert!(outcome.warnings.is_empty());
    assert_eq!(sleeper.pauses(), vec![Duration::from_secs(2); 2]);

    let state = service.state();
    assert_eq!(state.cherry_pick_polls, 3);
    assert_eq!(state.cherry_pick_requests.len(), 1);
    let request = &state.cherry_pick_requests[0];
    assert_eq!(request.commits, vec!["abc123".to_string()]);
    assert_eq!(request.onto_branch, "insertions/Roslyn-main-20240101.1");
    assert_eq!(
        request.generated_branch,
        "insertions/Roslyn-main-20240101.1-cherry-pick"
    );

    assert_eq!(state.ref_updates.len(), 1);
    let update = &state.ref_updates[0];
    assert_eq!(update.branch, "insertions/Roslyn-main-20240101.1");
    assert_eq!(update.old_object_id, "pushed-1");
    assert_eq!(update.new_object_id, "cherry-picked");

    let description = &state.created[0].description;
    assert!(description.contains("### Cherry-picked commits"));
    assert!(description.contains("- abc123"));
}

#[test]
fn test_failed_cherry_pick_warns_and_keeps_branch() {
    testing_logger::setup();
    let artifacts = ArtifactsFixture::new().with_package("Foo.1.1.0.nupkg");
    let options = options(artifacts.path(), "cherry-pick: [abc123]\n");
    let service = service(&[OperationStatus::InProgress, OperationStatus::Failed]);

    let outcome = Insertion::new(&options, &service, Some(&service))
        .with_sleeper(&RecordingSleeper::new())
        .run();

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.final_state, InsertionState::Success);
    assert_ne!(outcome.pull_request_id, 0);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("conflict in src/Compilers/Core/Version.cs"));

    let state = service.state();
    assert_eq!(state.cherry_pick_polls, 2);
    assert!(state.ref_updates.is_empty());
    assert_eq!(state.created.len(), 1);

    testing_logger::validate(|captured| {
        let warnings: Vec<_> = captured
            .iter()
            .filter(|log| log.level == log::Level::Warn)
            .collect();
        assert!(warnings
            .iter()
            .any(|log| log.body.contains("Cherry-pick failed")));
    });
}

#[test]
fn test_cherry_pick_timeout_is_a_warning() {
    let artifacts = ArtifactsFixture::new().with_package("Foo.1.1.0.nupkg");
    let options = options(
        artifacts.path(),
        "cherry-pick: [abc123]\npoll-interval-secs: 5\ncherry-pick-timeout-secs: 12\n",
    );
    let service = service(&[OperationStatus::InProgress]);
    let sleeper = RecordingSleeper::new();

    let outcome = Insertion::new(&options, &service, Some(&service))
        .with_sleeper(&sleeper)
        .run();

    assert!(outcome.success, "{:?}", outcome.error);
    assert!(outcome.warnings[0].contains("Timed out"));
    assert_eq!(
        sleeper.pauses(),
        vec![
            Duration::from_secs(5),
            Duration::from_secs(5),
            Duration::from_secs(2)
        ]
    );
    assert!(service.state().ref_updates.is_empty());
}

#[test]
fn test_cherry_pick_only_run_creates_branch_at_target_head() {
    let artifacts = ArtifactsFixture::new().with_package("Foo.1.0.0.nupkg");
    let options = options(artifacts.path(), "cherry-pick: [abc123, def456]\n");
    let service = service(&[OperationStatus::Completed]);

    let outcome = Insertion::new(&options, &service, Some(&service))
        .with_sleeper(&RecordingSleeper::new())
        .run();

    assert!(outcome.success, "{:?}", outcome.error);
    assert!(!outcome.is_noop());
    assert!(outcome.changes.is_empty());

    let state = service.state();
    assert!(state.pushes.is_empty());
    assert_eq!(state.ref_updates.len(), 2);
    assert_eq!(state.ref_updates[0].old_object_id, NULL_OBJECT_ID);
    assert_eq!(state.ref_updates[0].new_object_id, BASE_COMMIT);
    assert_eq!(state.ref_updates[1].old_object_id, BASE_COMMIT);
    assert_eq!(state.ref_updates[1].new_object_id, "cherry-picked");
    assert_eq!(state.cherry_pick_requests[0].commits.len(), 2);
    assert_eq!(state.created.len(), 1);
}
