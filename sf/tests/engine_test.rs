//! End-to-end runs of the workflow engine against a scripted gateway

mod common;

use std::sync::Arc;

use common::*;
use specflow::validation::rules;
use specflow::{
    ApprovalResponse, CoveragePolicy, ErrorKind, Outcome, Phase, WorkflowError, WorkflowEvent, WorkflowSnapshot,
};

async fn run_to_gate(engine: &specflow::WorkflowEngine) -> (Vec<WorkflowEvent>, specflow::WorkflowState) {
    engine.start("Python 3.10+ with FastAPI").await.unwrap().collect().await.unwrap()
}

#[tokio::test]
async fn test_happy_path_reaches_implemented() {
    let dir = seeded_dir();
    let gateway = Arc::new(ScriptedGateway::happy());
    let engine = engine(dir.path(), test_config(), gateway.clone()).await;

    let (events, state) = run_to_gate(&engine).await;
    assert_eq!(state.phase(), Phase::AwaitingApproval);
    let Some(WorkflowEvent::RequestInfo { request, .. }) = events.last() else {
        panic!("expected RequestInfo, got {:?}", events.last());
    };
    assert_eq!(request.task_count, 3);
    let outputs = format!("outputs/{}", state.run_id());
    assert_eq!(request.tasks_path, format!("{}/tasks.md", outputs));
    assert!(request.message.contains("Generated 3 tasks"));
    assert!(request.preview.contains("T001"));

    let response = ApprovalResponse::approve(request.id).with_rationale("ship it");
    let (events, state) = engine.resume(&state, response).await.unwrap().collect().await.unwrap();
    assert_eq!(state.phase(), Phase::Implemented);
    assert!(matches!(events.first(), Some(WorkflowEvent::DecisionRecorded { approved: true, .. })));
    let Some(WorkflowEvent::Completed { files, .. }) = events.last() else {
        panic!("expected Completed, got {:?}", events.last());
    };
    assert_eq!(files.len(), 3);

    let phases: Vec<Phase> = state.history().iter().map(|e| e.phase).collect();
    assert_eq!(
        phases,
        vec![
            Phase::ContextLoaded,
            Phase::PlanReady,
            Phase::TasksReady,
            Phase::Approved,
            Phase::Implemented
        ]
    );
    assert!(matches!(
        &state.history()[3].outcome,
        Outcome::Decision { approved: true, rationale: Some(r), .. } if r == "ship it"
    ));

    for name in ["plan.md", "tasks.md", "implementation.md", "src/store.py"] {
        let path = dir.path().join(&outputs).join(name);
        assert!(path.exists(), "{} missing", path.display());
    }
    assert_eq!(gateway.calls(), 3);
    let prompts = gateway.prompts();
    assert!(prompts[1].contains("TaskStore: persists each Task"));
    assert!(prompts[2].contains("T003"));
}

#[tokio::test]
async fn test_timeouts_within_budget_are_recorded() {
    let dir = seeded_dir();
    let gateway = Arc::new(ScriptedGateway::new(vec![
        timeout(),
        timeout(),
        Ok(PLAN.to_string()),
        Ok(TASKS.to_string()),
    ]));
    let engine = engine(dir.path(), test_config(), gateway.clone()).await;

    let (events, state) = run_to_gate(&engine).await;
    assert_eq!(state.phase(), Phase::AwaitingApproval);
    let attempts: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            WorkflowEvent::AttemptFailed { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2]);

    let plan_entries: Vec<&Outcome> = state
        .history()
        .iter()
        .filter(|e| e.phase == Phase::PlanReady)
        .map(|e| &e.outcome)
        .collect();
    assert_eq!(plan_entries.len(), 3);
    assert!(plan_entries[0].is_failed_attempt());
    assert!(plan_entries[1].is_failed_attempt());
    assert!(plan_entries[2].is_completion());
}

#[tokio::test]
async fn test_budget_exhausted_fails_run() {
    let dir = seeded_dir();
    let gateway = Arc::new(ScriptedGateway::new(vec![timeout(), timeout(), timeout()]));
    let engine = engine(dir.path(), test_config(), gateway.clone()).await;

    let (events, state) = run_to_gate(&engine).await;
    assert_eq!(state.phase(), Phase::Failed);
    assert_eq!(gateway.calls(), 3);
    assert!(matches!(
        events.last(),
        Some(WorkflowEvent::Failed {
            phase: Phase::PlanReady,
            kind: ErrorKind::GenerationFailed,
            ..
        })
    ));
    assert!(state.plan().is_none());
}

#[tokio::test]
async fn test_rejection_is_terminal() {
    let dir = seeded_dir();
    let gateway = Arc::new(ScriptedGateway::happy());
    let engine = engine(dir.path(), test_config(), gateway.clone()).await;

    let (_, suspended) = run_to_gate(&engine).await;
    let request_id = suspended.pending_request().unwrap().id;

    let response = ApprovalResponse::reject(request_id).with_rationale("too broad");
    let (events, state) = engine.resume(&suspended, response).await.unwrap().collect().await.unwrap();
    assert_eq!(state.phase(), Phase::Rejected);
    assert!(matches!(
        events.last(),
        Some(WorkflowEvent::Rejected { rationale: Some(r), .. }) if r == "too broad"
    ));
    assert!(state.implementation().is_none());
    assert_eq!(gateway.calls(), 2);

    let err = engine
        .resume(&state, ApprovalResponse::approve(request_id))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidResume { phase: Phase::Rejected }));
}

#[tokio::test]
async fn test_resume_outside_gate_leaves_state_alone() {
    let dir = seeded_dir();
    let gateway = Arc::new(ScriptedGateway::new(vec![timeout(), timeout(), timeout()]));
    let engine = engine(dir.path(), test_config(), gateway).await;

    let (_, failed) = run_to_gate(&engine).await;
    let before = failed.clone();
    let persisted = engine.load(failed.run_id()).await.unwrap();

    let err = engine
        .resume(&failed, ApprovalResponse::approve(uuid::Uuid::now_v7()))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidResume { phase: Phase::Failed }));
    assert_eq!(failed, before);
    assert_eq!(engine.load(failed.run_id()).await.unwrap(), persisted);
}

#[tokio::test]
async fn test_unknown_and_duplicate_responses() {
    let dir = seeded_dir();
    let gateway = Arc::new(ScriptedGateway::happy());
    let engine = engine(dir.path(), test_config(), gateway).await;

    let (_, suspended) = run_to_gate(&engine).await;
    let request_id = suspended.pending_request().unwrap().id;

    let err = engine
        .resume(&suspended, ApprovalResponse::approve(uuid::Uuid::now_v7()))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::UnknownApprovalRequest(_)));
    assert_eq!(suspended.phase(), Phase::AwaitingApproval);

    let (_, done) = engine
        .resume(&suspended, ApprovalResponse::approve(request_id))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(done.phase(), Phase::Implemented);

    // Same suspended state, second answer
    let err = engine
        .resume(&suspended, ApprovalResponse::reject(request_id))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::DuplicateResponse(id) if id == request_id));
}

#[tokio::test]
async fn test_missing_coverage_is_advisory_by_default() {
    let dir = seeded_dir();
    let gateway = Arc::new(ScriptedGateway::new(vec![
        Ok(PLAN.to_string()),
        Ok(TASKS.to_string()),
        Ok(IMPLEMENTATION_WITHOUT_T003.to_string()),
    ]));
    let engine = engine(dir.path(), test_config(), gateway).await;

    let (_, suspended) = run_to_gate(&engine).await;
    let request_id = suspended.pending_request().unwrap().id;
    let (_, state) = engine
        .resume(&suspended, ApprovalResponse::approve(request_id))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(state.phase(), Phase::Implemented);
    let report = state.implementation().unwrap().report();
    assert!(report.is_valid());
    assert_eq!(report.count(rules::MISSING_TASK_COVERAGE), 1);
    assert!(report.warnings().any(|v| v.message.contains("T003")));
}

#[tokio::test]
async fn test_missing_coverage_fails_when_strict() {
    let dir = seeded_dir();
    let mut config = test_config();
    config.validation.coverage_policy = CoveragePolicy::Strict;
    config.generation.corrective_retry = false;
    let gateway = Arc::new(ScriptedGateway::new(vec![
        Ok(PLAN.to_string()),
        Ok(TASKS.to_string()),
        Ok(IMPLEMENTATION_WITHOUT_T003.to_string()),
    ]));
    let engine = engine(dir.path(), config, gateway).await;

    let (_, suspended) = run_to_gate(&engine).await;
    let request_id = suspended.pending_request().unwrap().id;
    let (events, state) = engine
        .resume(&suspended, ApprovalResponse::approve(request_id))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(state.phase(), Phase::Failed);
    let Some(WorkflowEvent::Failed { kind, violations, .. }) = events.last() else {
        panic!("expected Failed, got {:?}", events.last());
    };
    assert_eq!(*kind, ErrorKind::ValidationFailed);
    assert!(violations.iter().any(|v| v.rule_id == rules::MISSING_TASK_COVERAGE));
}

#[tokio::test]
async fn test_corrective_retry_repairs_plan() {
    let dir = seeded_dir();
    let gateway = Arc::new(ScriptedGateway::new(vec![
        Ok("# Plan\nJust some prose.\n".to_string()),
        Ok(PLAN.to_string()),
        Ok(TASKS.to_string()),
    ]));
    let engine = engine(dir.path(), test_config(), gateway.clone()).await;

    let (events, state) = run_to_gate(&engine).await;
    assert_eq!(state.phase(), Phase::AwaitingApproval);
    assert!(events.iter().any(|e| matches!(e, WorkflowEvent::CorrectiveRetry { .. })));
    assert!(gateway.prompts()[1].contains(rules::MISSING_TECHNICAL_CONTEXT));
    assert!(
        state
            .history()
            .iter()
            .any(|e| matches!(e.outcome, Outcome::CorrectiveRetry { .. }))
    );
}

#[tokio::test]
async fn test_missing_seed_is_an_error() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("constitution.md"), CONSTITUTION).unwrap();
    let gateway = Arc::new(ScriptedGateway::happy());
    let engine = engine(dir.path(), test_config(), gateway.clone()).await;

    let err = engine.start("Rust").await.unwrap_err();
    assert!(matches!(err, WorkflowError::MissingInput { ref name } if name.contains("spec.md")));
    assert_eq!(gateway.calls(), 0);
    assert!(engine.list_runs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_constitution_without_principles_fails() {
    let dir = seeded_dir();
    std::fs::write(dir.path().join("constitution.md"), "Be nice.\n").unwrap();
    let gateway = Arc::new(ScriptedGateway::happy());
    let engine = engine(dir.path(), test_config(), gateway.clone()).await;

    let (events, state) = run_to_gate(&engine).await;
    assert_eq!(state.phase(), Phase::Failed);
    assert!(matches!(
        events.last(),
        Some(WorkflowEvent::Failed {
            phase: Phase::ContextLoaded,
            kind: ErrorKind::ValidationFailed,
            ..
        })
    ));
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn test_cancel_during_generation() {
    let dir = seeded_dir();
    let gateway = Arc::new(ScriptedGateway::new(Vec::new()).hanging());
    let engine = engine(dir.path(), test_config(), gateway.clone()).await;

    let mut run = engine.start("Rust").await.unwrap();
    loop {
        match run.next_event().await {
            Some(WorkflowEvent::PhaseStarted { phase: Phase::PlanReady, .. }) => break,
            Some(_) => continue,
            None => panic!("stream ended before generation started"),
        }
    }
    run.cancel();

    let (events, state) = run.collect().await.unwrap();
    assert_eq!(state.phase(), Phase::Failed);
    assert!(matches!(
        events.last(),
        Some(WorkflowEvent::Failed {
            kind: ErrorKind::Cancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn test_snapshot_round_trip() {
    let dir = seeded_dir();
    let gateway = Arc::new(ScriptedGateway::happy());
    let engine = engine(dir.path(), test_config(), gateway).await;

    let (_, suspended) = run_to_gate(&engine).await;
    let snapshot = engine.snapshot(&suspended);
    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(!json.contains("TaskStore: persists each Task"));

    let decoded: WorkflowSnapshot = serde_json::from_str(&json).unwrap();
    let restored = engine.restore(&decoded).await.unwrap();
    assert_eq!(restored, suspended);
    assert_eq!(engine.snapshot(&restored), snapshot);
}

#[tokio::test]
async fn test_resume_from_another_engine() {
    let dir = seeded_dir();
    let first = engine(dir.path(), test_config(), Arc::new(ScriptedGateway::happy())).await;
    let (_, suspended) = run_to_gate(&first).await;
    let run_id = suspended.run_id();
    let request_id = suspended.pending_request().unwrap().id;
    drop(first);

    let gateway = Arc::new(ScriptedGateway::new(vec![Ok(IMPLEMENTATION.to_string())]));
    let second = engine(dir.path(), test_config(), gateway).await;
    let restored = second.load(run_id).await.unwrap();
    assert_eq!(restored.phase(), Phase::AwaitingApproval);

    let (_, state) = second
        .resume(&restored, ApprovalResponse::approve(request_id))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(state.phase(), Phase::Implemented);

    // A third process replaying the ledger sees the answer
    let third = engine(dir.path(), test_config(), Arc::new(ScriptedGateway::happy())).await;
    let err = third
        .resume(&restored, ApprovalResponse::approve(request_id))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::DuplicateResponse(_)));
    assert_eq!(third.load(run_id).await.unwrap().phase(), Phase::Implemented);
}

#[tokio::test]
async fn test_edited_artifact_blocks_restore() {
    let dir = seeded_dir();
    let engine = engine(dir.path(), test_config(), Arc::new(ScriptedGateway::happy())).await;
    let (_, suspended) = run_to_gate(&engine).await;

    let tasks = dir.path().join(format!("outputs/{}/tasks.md", suspended.run_id()));
    std::fs::write(tasks, "- [ ] T001 [US1] edited in a.py\n").unwrap();
    let err = engine.load(suspended.run_id()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Snapshot(msg) if msg.contains("tasks.md")));
}

#[tokio::test]
async fn test_two_runs_in_one_directory() {
    let dir = seeded_dir();
    let first = engine(dir.path(), test_config(), Arc::new(ScriptedGateway::happy())).await;
    let (_, first_suspended) = run_to_gate(&first).await;

    let short_tasks = "# Tasks\n\n## Phase 1: Setup\n- [ ] T001 [US1] Create the app entry point in src/main.py\n\
                       - [ ] T002 [US1] Implement TaskStore in src/store.py (depends on T001)\n";
    let gateway = Arc::new(ScriptedGateway::new(vec![
        Ok(PLAN.to_string()),
        Ok(short_tasks.to_string()),
        Ok(IMPLEMENTATION_WITHOUT_T003.to_string()),
    ]));
    let second = engine(dir.path(), test_config(), gateway).await;
    let (_, second_suspended) = run_to_gate(&second).await;

    let first_request = first_suspended.pending_request().unwrap().clone();
    let second_request = second_suspended.pending_request().unwrap().clone();
    assert_ne!(first_request.tasks_path, second_request.tasks_path);
    assert_eq!(first_request.task_count, 3);
    assert_eq!(second_request.task_count, 2);
    let on_disk = std::fs::read_to_string(dir.path().join(&first_request.tasks_path)).unwrap();
    assert!(on_disk.contains("T003"));
    let on_disk = std::fs::read_to_string(dir.path().join(&second_request.tasks_path)).unwrap();
    assert!(!on_disk.contains("T003"));

    // Both restore intact from disk
    let first_restored = first.load(first_suspended.run_id()).await.unwrap();
    let second_restored = second.load(second_suspended.run_id()).await.unwrap();
    assert_eq!(first_restored, first_suspended);
    assert_eq!(second_restored, second_suspended);

    let (_, done) = second
        .resume(&second_restored, ApprovalResponse::approve(second_request.id))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(done.phase(), Phase::Implemented);
    assert_eq!(done.implementation().unwrap().report().count(rules::MISSING_TASK_COVERAGE), 0);

    let (_, done) = first
        .resume(&first_restored, ApprovalResponse::approve(first_request.id))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(done.phase(), Phase::Implemented);
    assert_eq!(first.list_runs().await.unwrap().len(), 2);
    for snapshot in first.list_runs().await.unwrap() {
        first.restore(&snapshot).await.unwrap();
    }
}

/// Snapshot -> JSON -> restore gives back `state` and the same snapshot
async fn assert_round_trip(engine: &specflow::WorkflowEngine, state: &specflow::WorkflowState) {
    let snapshot = engine.snapshot(state);
    let decoded: WorkflowSnapshot = serde_json::from_str(&serde_json::to_string(&snapshot).unwrap()).unwrap();
    let restored = engine.restore(&decoded).await.unwrap();
    assert_eq!(&restored, state, "round trip at {}", state.phase());
    assert_eq!(engine.snapshot(&restored), snapshot);
    assert_eq!(&engine.load(state.run_id()).await.unwrap(), state);
}

#[tokio::test]
async fn test_snapshot_round_trip_at_terminal_phases() {
    let dir = seeded_dir();
    let engine = engine(dir.path(), test_config(), Arc::new(ScriptedGateway::happy())).await;
    let (_, suspended) = run_to_gate(&engine).await;
    let request_id = suspended.pending_request().unwrap().id;
    let (_, implemented) = engine
        .resume(&suspended, ApprovalResponse::approve(request_id))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(implemented.phase(), Phase::Implemented);
    assert_round_trip(&engine, &implemented).await;

    let engine = engine_with(&dir, ScriptedGateway::new(vec![Ok(PLAN.to_string()), Ok(TASKS.to_string())])).await;
    let (_, suspended) = run_to_gate(&engine).await;
    let request_id = suspended.pending_request().unwrap().id;
    let (_, rejected) = engine
        .resume(&suspended, ApprovalResponse::reject(request_id).with_rationale("no"))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(rejected.phase(), Phase::Rejected);
    assert_round_trip(&engine, &rejected).await;

    let gateway = ScriptedGateway::new(vec![Ok(PLAN.to_string()), timeout(), timeout(), timeout()]);
    let engine = engine_with(&dir, gateway).await;
    let (_, failed) = run_to_gate(&engine).await;
    assert_eq!(failed.phase(), Phase::Failed);
    assert!(failed.plan().is_some());
    assert_round_trip(&engine, &failed).await;
}

async fn engine_with(dir: &tempfile::TempDir, gateway: ScriptedGateway) -> specflow::WorkflowEngine {
    engine(dir.path(), test_config(), Arc::new(gateway)).await
}

#[tokio::test]
async fn test_restore_keeps_reports_after_policy_change() {
    let dir = seeded_dir();
    let gateway = Arc::new(ScriptedGateway::new(vec![
        Ok(PLAN.to_string()),
        Ok(TASKS.to_string()),
        Ok(IMPLEMENTATION_WITHOUT_T003.to_string()),
    ]));
    let advisory = engine(dir.path(), test_config(), gateway).await;
    let (_, suspended) = run_to_gate(&advisory).await;
    let request_id = suspended.pending_request().unwrap().id;
    let (_, state) = advisory
        .resume(&suspended, ApprovalResponse::approve(request_id))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(state.phase(), Phase::Implemented);
    assert!(state.implementation().unwrap().report().is_valid());

    let mut config = test_config();
    config.validation.coverage_policy = CoveragePolicy::Strict;
    let strict = engine(dir.path(), config, Arc::new(ScriptedGateway::new(Vec::new()))).await;
    let restored = strict.load(state.run_id()).await.unwrap();
    assert_eq!(restored, state);
    let report = restored.implementation().unwrap().report();
    assert!(report.is_valid());
    assert_eq!(report.count(rules::MISSING_TASK_COVERAGE), 1);
}

#[tokio::test]
async fn test_failed_checkpoint_on_resume_can_be_retried() {
    let dir = seeded_dir();
    let engine = engine(dir.path(), test_config(), Arc::new(ScriptedGateway::happy())).await;
    let (_, suspended) = run_to_gate(&engine).await;
    let request_id = suspended.pending_request().unwrap().id;

    // a directory where the snapshot file belongs makes the save fail
    let snapshot_path = dir.path().join(format!(".specflow/runs/{}.json", suspended.run_id()));
    let saved = std::fs::read(&snapshot_path).unwrap();
    std::fs::remove_file(&snapshot_path).unwrap();
    std::fs::create_dir(&snapshot_path).unwrap();

    let err = engine
        .resume(&suspended, ApprovalResponse::approve(request_id))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Store(_)), "got {:?}", err);

    std::fs::remove_dir(&snapshot_path).unwrap();
    std::fs::write(&snapshot_path, saved).unwrap();
    let reloaded = engine.load(suspended.run_id()).await.unwrap();
    assert_eq!(reloaded.phase(), Phase::AwaitingApproval);

    let (_, state) = engine
        .resume(&reloaded, ApprovalResponse::approve(request_id))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(state.phase(), Phase::Implemented);
    assert_eq!(engine.load(state.run_id()).await.unwrap().phase(), Phase::Implemented);
}

#[tokio::test]
async fn test_failed_checkpoint_on_start_fails_run() {
    let dir = seeded_dir();
    // a file where the runs directory belongs
    std::fs::create_dir_all(dir.path().join(".specflow")).unwrap();
    std::fs::write(dir.path().join(".specflow/runs"), "").unwrap();
    let gateway = Arc::new(ScriptedGateway::happy());
    let engine = engine(dir.path(), test_config(), gateway.clone()).await;

    let (events, state) = run_to_gate(&engine).await;
    assert_eq!(state.phase(), Phase::Failed);
    assert!(matches!(
        events.last(),
        Some(WorkflowEvent::Failed {
            kind: ErrorKind::Store,
            ..
        })
    ));
    assert_eq!(gateway.calls(), 0);
}
