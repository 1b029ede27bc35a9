// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end behavior of the engine through the ingestion facade.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use promptd_core::{ContinuationContext, Fragment, QueryEvent, QueryId, QueryState};
use promptd_engine::{IngestionFacade, QueryStore, Worker};
use promptd_test_utils::{
    MockBackend, ScriptStep, TestHarness, completed_script, failing_script,
    mock_backend::DEFAULT_CONTEXT,
};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn sky_blue_scenario() {
    let harness = TestHarness::builder()
        .with_scripts(vec![vec![
            ScriptStep::Fragment(Fragment::text("The")),
            ScriptStep::Fragment(Fragment::text(" sky")),
            ScriptStep::Fragment(Fragment::last(" is blue because...", None)),
        ]])
        .build();

    let id = harness.facade.submit("Why is the sky blue?", None);
    let status = harness.wait_for_completion(&id).await.unwrap();

    assert_eq!(status.state, QueryState::Completed);
    assert!(!status.canceled_requested);
    assert_eq!(
        status.partial_responses,
        vec!["The", " sky", " is blue because..."]
    );
    assert_eq!(status.full_response, "The sky is blue because...");
    assert!(status.continuation_context.is_none());
    assert!(status.error.is_none());
}

#[tokio::test]
async fn status_right_after_submit_is_never_terminal_canceled() {
    let harness = TestHarness::builder().build();
    for i in 0..20 {
        let id = harness.facade.submit(format!("prompt {i}"), None);
        let state = harness.facade.status(&id).unwrap().state;
        assert!(matches!(
            state,
            QueryState::Queued | QueryState::Running | QueryState::Completed
        ));
    }
}

#[tokio::test]
async fn queries_start_in_submission_order() {
    let harness = TestHarness::builder().gated().build();

    let facade_a = harness.facade.clone();
    let facade_b = harness.facade.clone();
    let p1 = tokio::spawn(async move { facade_a.submit("P1", None) })
        .await
        .unwrap();
    let p2 = tokio::spawn(async move { facade_b.submit("P2", None) })
        .await
        .unwrap();

    harness
        .wait_until(&p1, |s| s.state == QueryState::Running)
        .await
        .unwrap();
    assert_eq!(harness.facade.status(&p2).unwrap().state, QueryState::Queued);

    // Default script: two text fragments and a final one, per query.
    harness.backend.release(6);
    harness.wait_for_completion(&p1).await.unwrap();
    harness.wait_for_completion(&p2).await.unwrap();

    let prompts: Vec<String> = harness
        .backend
        .requests()
        .await
        .into_iter()
        .map(|r| r.prompt)
        .collect();
    assert_eq!(prompts, vec!["P1", "P2"]);
}

#[tokio::test]
async fn submissions_made_before_worker_start_run_in_order() {
    let store = Arc::new(QueryStore::new());
    let facade = IngestionFacade::new(store.clone());

    // Two callers submit, one after the other, while no worker exists.
    let caller_a = facade.clone();
    let p1 = tokio::spawn(async move { caller_a.submit("P1", None) })
        .await
        .unwrap();
    let caller_b = facade.clone();
    let p2 = tokio::spawn(async move { caller_b.submit("P2", None) })
        .await
        .unwrap();
    assert_eq!(facade.status(&p1).unwrap().state, QueryState::Queued);
    assert_eq!(facade.status(&p2).unwrap().state, QueryState::Queued);

    let backend = Arc::new(MockBackend::new().gated());
    let shutdown = CancellationToken::new();
    let worker = Worker::new(store.clone(), backend.clone(), "mock-model", shutdown.clone()).spawn();

    // P1 is picked up first and holds the worker while P2 waits.
    wait_for_state(&facade, &p1, QueryState::Running).await;
    assert_eq!(facade.status(&p2).unwrap().state, QueryState::Queued);

    backend.release(6);
    wait_for_state(&facade, &p2, QueryState::Completed).await;
    assert_eq!(facade.status(&p1).unwrap().state, QueryState::Completed);

    let prompts: Vec<String> = backend
        .requests()
        .await
        .into_iter()
        .map(|r| r.prompt)
        .collect();
    assert_eq!(prompts, vec!["P1", "P2"]);

    shutdown.cancel();
    worker.await.unwrap();
}

async fn wait_for_state(facade: &IngestionFacade, id: &QueryId, state: QueryState) {
    for _ in 0..1000 {
        if facade.status(id).unwrap().state == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("query {id} never reached {state}");
}

#[tokio::test]
async fn cancel_while_running_stops_at_next_fragment() {
    let harness = TestHarness::builder()
        .with_scripts(vec![completed_script(
            &["a", "b", "c", "d"],
            Some(ContinuationContext::new(vec![5])),
        )])
        .gated()
        .build();

    let id = harness.facade.submit("long answer", None);
    harness
        .wait_until(&id, |s| s.state == QueryState::Running)
        .await
        .unwrap();

    harness.backend.release(1);
    harness
        .wait_until(&id, |s| s.partial_responses.len() == 1)
        .await
        .unwrap();

    assert!(harness.facade.cancel(&id));
    assert!(harness.facade.status(&id).unwrap().canceled_requested);

    harness.backend.release(1);
    let status = harness.wait_for_completion(&id).await.unwrap();

    assert_eq!(status.state, QueryState::Completed);
    assert!(status.canceled_requested);
    assert_eq!(status.partial_responses, vec!["a", "b"]);
    assert!(status.continuation_context.is_none());
    assert!(status.error.is_none());
    assert_eq!(harness.backend.streams_dropped(), 1);
}

#[tokio::test]
async fn cancel_before_start_skips_generation() {
    let harness = TestHarness::builder().gated().build();

    let blocker = harness.facade.submit("blocker", None);
    harness
        .wait_until(&blocker, |s| s.state == QueryState::Running)
        .await
        .unwrap();

    let id = harness.facade.submit("never runs", None);
    assert!(harness.facade.cancel(&id));

    harness.backend.release(3);
    harness.wait_for_completion(&blocker).await.unwrap();
    let status = harness.wait_for_completion(&id).await.unwrap();

    assert_eq!(status.state, QueryState::Completed);
    assert!(status.canceled_requested);
    assert!(status.partial_responses.is_empty());
    assert_eq!(harness.backend.requests().await.len(), 1);
}

#[tokio::test]
async fn cancel_unknown_or_completed_has_no_effect() {
    let harness = TestHarness::builder().gated().build();

    let done = harness.facade.submit("first", None);
    harness.backend.release(3);
    harness.wait_for_completion(&done).await.unwrap();

    let other = harness.facade.submit("second", None);
    let other_before = harness.facade.status(&other).unwrap();

    assert!(!harness.facade.cancel(&"does-not-exist".into()));
    assert!(!harness.facade.cancel(&done));
    assert!(!harness.facade.status(&done).unwrap().canceled_requested);

    let other_after = harness.facade.status(&other).unwrap();
    assert_eq!(other_before.canceled_requested, other_after.canceled_requested);
    assert!(!other_after.canceled_requested);
}

#[tokio::test]
async fn repeated_cancel_is_idempotent() {
    let harness = TestHarness::builder().gated().build();
    let id = harness.facade.submit("x", None);
    assert!(harness.facade.cancel(&id));
    assert!(!harness.facade.cancel(&id));
    harness.backend.release(3);
    let status = harness.wait_for_completion(&id).await.unwrap();
    assert!(status.canceled_requested);
}

#[tokio::test]
async fn partial_responses_only_grow() {
    let texts = ["one", " two", " three", " four", " five"];
    let harness = TestHarness::builder()
        .with_scripts(vec![completed_script(&texts, None)])
        .gated()
        .build();
    let id = harness.facade.submit("count", None);

    let mut previous: Vec<String> = Vec::new();
    for step in 0..=texts.len() {
        harness.backend.release(1);
        let status = harness
            .wait_until(&id, |s| s.partial_responses.len() > step.min(texts.len() - 1) || s.completed)
            .await
            .unwrap();
        assert!(status.partial_responses.len() >= previous.len());
        assert_eq!(&status.partial_responses[..previous.len()], &previous[..]);
        previous = status.partial_responses;
    }

    let status = harness.wait_for_completion(&id).await.unwrap();
    assert_eq!(status.partial_responses, texts);
}

#[tokio::test]
async fn backend_failure_keeps_partials_and_worker_continues() {
    let harness = TestHarness::builder()
        .with_scripts(vec![
            failing_script(&["The", " sky"], "connection reset"),
            completed_script(&["next"], None),
        ])
        .build();

    let failed = harness.facade.submit("first", None);
    let next = harness.facade.submit("second", None);

    let status = harness.wait_for_completion(&failed).await.unwrap();
    assert_eq!(status.state, QueryState::Completed);
    assert_eq!(status.partial_responses, vec!["The", " sky"]);
    assert!(status.continuation_context.is_none());
    assert!(status.error.as_deref().unwrap().contains("connection reset"));

    let status = harness.wait_for_completion(&next).await.unwrap();
    assert_eq!(status.full_response, "next");
    assert!(status.error.is_none());
}

#[tokio::test]
async fn backend_that_fails_to_start_completes_empty() {
    let harness = TestHarness::builder().build();
    harness.backend.fail_next_start("model not found").await;

    let id = harness.facade.submit("hello", None);
    let status = harness.wait_for_completion(&id).await.unwrap();
    assert_eq!(status.state, QueryState::Completed);
    assert!(status.partial_responses.is_empty());
    assert!(status.error.as_deref().unwrap().contains("model not found"));
}

#[tokio::test]
async fn stream_without_final_fragment_is_a_failure() {
    let harness = TestHarness::builder()
        .with_scripts(vec![vec![ScriptStep::Fragment(Fragment::text("half"))]])
        .build();
    let id = harness.facade.submit("hello", None);
    let status = harness.wait_for_completion(&id).await.unwrap();
    assert_eq!(status.partial_responses, vec!["half"]);
    assert!(status.error.is_some());
    assert!(status.continuation_context.is_none());
}

#[tokio::test]
async fn empty_fragments_are_not_recorded() {
    let harness = TestHarness::builder()
        .with_scripts(vec![vec![
            ScriptStep::Fragment(Fragment::text("")),
            ScriptStep::Fragment(Fragment::text("x")),
            ScriptStep::Fragment(Fragment::last("", None)),
        ]])
        .build();
    let id = harness.facade.submit("hello", None);
    let status = harness.wait_for_completion(&id).await.unwrap();
    assert_eq!(status.partial_responses, vec!["x"]);
}

#[tokio::test]
async fn continuation_context_flows_into_next_query() {
    let harness = TestHarness::builder().build();

    let first = harness.facade.submit("My name is Ada.", None);
    let status = harness.wait_for_completion(&first).await.unwrap();
    let context = status.continuation_context.unwrap();
    assert_eq!(context.tokens(), &DEFAULT_CONTEXT);

    let second = harness
        .facade
        .submit("What is my name?", Some(context.clone()));
    harness.wait_for_completion(&second).await.unwrap();

    let requests = harness.backend.requests().await;
    assert!(requests[0].context.is_none());
    assert_eq!(requests[1].context.as_ref(), Some(&context));
    assert_eq!(requests[1].model, "mock-model");
}

#[tokio::test]
async fn shutdown_interrupts_running_and_cancels_queued() {
    let mut harness = TestHarness::builder().gated().build();

    let running = harness.facade.submit("running", None);
    harness
        .wait_until(&running, |s| s.state == QueryState::Running)
        .await
        .unwrap();
    let queued_a = harness.facade.submit("queued a", None);
    let queued_b = harness.facade.submit("queued b", None);

    let canceled = harness.shutdown().await;
    assert_eq!(canceled, vec![queued_a.clone(), queued_b.clone()]);
    assert!(harness.worker_finished());

    let status = harness.facade.status(&running).unwrap();
    assert_eq!(status.state, QueryState::Completed);
    assert!(status.error.is_some());

    for id in [&queued_a, &queued_b] {
        let status = harness.facade.status(id).unwrap();
        assert_eq!(status.state, QueryState::Canceled);
        assert!(status.completed);
    }
}

#[tokio::test]
async fn lifecycle_events_are_reported() {
    let mut harness = TestHarness::builder().capture_events().build();
    let id = harness.facade.submit("hello", None);
    harness.wait_for_completion(&id).await.unwrap();

    let events = harness.events.as_mut().unwrap();
    let submitted = events.recv().await.unwrap();
    assert!(matches!(submitted, QueryEvent::Submitted { .. }));
    match events.recv().await.unwrap() {
        QueryEvent::Completed {
            query_id,
            fragments,
            canceled,
            ..
        } => {
            assert_eq!(query_id, id);
            assert_eq!(fragments, 2);
            assert!(!canceled);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn status_reads_do_not_wait_for_generation() {
    let harness = TestHarness::builder().gated().build();
    let id = harness.facade.submit("stalled", None);
    harness
        .wait_until(&id, |s| s.state == QueryState::Running)
        .await
        .unwrap();

    // The backend is stalled on the gate; status and cancel still answer.
    for _ in 0..100 {
        assert_eq!(harness.facade.status(&id).unwrap().state, QueryState::Running);
    }
    assert!(harness.facade.cancel(&id));
}

proptest! {
    #[test]
    fn submitted_ids_are_unique(prompts in prop::collection::vec(".{0,8}", 1..64)) {
        let facade = IngestionFacade::new(Arc::new(QueryStore::new()));
        let mut seen = HashSet::new();
        for prompt in prompts {
            let id = facade.submit(prompt, None);
            prop_assert!(seen.insert(id));
        }
    }
}
