// SPDX-FileCopyrightText: 2026 Drydock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end scenarios for the session coordinator.
//!
//! Each test builds an isolated harness (temp data directory, mock provider,
//! mock repo host) and drives the coordinator through its public handle with
//! scripted sandbox and client peers. Tests are independent and
//! order-insensitive.

use drydock_coordinator::PrOrigin;
use drydock_core::protocol::{SandboxCommand, SandboxEvent, ServerFrame};
use drydock_core::types::{EventType, MessageStatus, SandboxStatus};
use drydock_core::DrydockError;
use drydock_test_utils::harness::{OWNER_ACCESS_TOKEN, OWNER_USER_ID};
use drydock_test_utils::TestHarness;

// ---- Scenario 1: happy prompt ----

#[tokio::test]
async fn happy_prompt_executes_and_snapshots() {
    let harness = TestHarness::builder().build().await.unwrap();
    let handle = harness.create_session().await.unwrap();
    let (mut client, _token) = harness
        .connect_client(&handle, OWNER_USER_ID, "web-1")
        .await
        .unwrap();

    // The subscribe flow answered with the current state.
    let subscribed = client
        .wait_for(|f| matches!(f, ServerFrame::Subscribed { .. }))
        .await
        .expect("subscribed frame");
    if let ServerFrame::Subscribed { session_id, .. } = subscribed {
        assert_eq!(session_id, handle.session_id());
    }

    let queued = handle
        .enqueue_prompt(prompt("rename foo"))
        .await
        .unwrap();
    assert_eq!(queued.position, 1);

    // The prompt triggered a spawn; the provider accepted it.
    let sandbox = harness
        .read_sandbox(handle.session_id())
        .await
        .unwrap()
        .expect("sandbox row");
    assert_eq!(sandbox.status, SandboxStatus::Connecting);
    assert!(sandbox.object_id.is_some());
    assert!(sandbox.auth_token.len() >= 32, "at least 128 bits of entropy");

    // The bridge connects; the queued prompt is dispatched.
    let mut bridge = harness.connect_sandbox(&handle).await.unwrap();
    let command = bridge.recv_command().await.expect("prompt command");
    let SandboxCommand::Prompt {
        message_id,
        content,
        author,
        ..
    } = command
    else {
        panic!("expected prompt command");
    };
    assert_eq!(message_id, queued.message_id);
    assert_eq!(content, "rename foo");
    assert_eq!(author.github_email.as_deref(), Some("owner@example.com"));

    client
        .wait_for(|f| matches!(f, ServerFrame::ProcessingStatus { is_processing: true }))
        .await
        .expect("processing started");

    // Stream tokens, then complete.
    bridge
        .send_event(SandboxEvent::Token {
            content: "renaming".to_string(),
            message_id: Some(message_id.clone()),
        })
        .await;
    bridge
        .send_event(SandboxEvent::ExecutionComplete {
            message_id: message_id.clone(),
            success: true,
            error: None,
        })
        .await;

    client
        .wait_for(|f| matches!(f, ServerFrame::ProcessingStatus { is_processing: false }))
        .await
        .expect("processing finished");
    client
        .wait_for(|f| matches!(f, ServerFrame::SnapshotSaved { .. }))
        .await
        .expect("snapshot on execution_complete");

    let (messages, _) = handle.list_messages(None, 10, None).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, MessageStatus::Completed);

    // Token events carry the message correlation.
    let (events, _) = handle
        .list_events(None, 50, Some(EventType::Token), None)
        .await
        .unwrap();
    assert!(!events.is_empty());
    assert_eq!(events[0].message_id.as_deref(), Some(message_id.as_str()));

    assert_eq!(harness.provider.snapshot_calls(), 1);
}

// ---- Scenario 2: queue ordering ----

#[tokio::test]
async fn queue_preserves_enqueue_order() {
    let harness = TestHarness::builder().build().await.unwrap();
    let handle = harness.create_session().await.unwrap();

    // Bring the sandbox up first so the first prompt dispatches immediately.
    handle.warm().await.unwrap();
    let mut bridge = harness.connect_sandbox(&handle).await.unwrap();

    let q1 = handle.enqueue_prompt(prompt("first")).await.unwrap();
    let q2 = handle.enqueue_prompt(prompt("second")).await.unwrap();
    let q3 = handle.enqueue_prompt(prompt("third")).await.unwrap();
    assert_eq!(q1.position, 1);
    assert_eq!(q2.position, 2);
    assert_eq!(q3.position, 3);

    // Completion order equals enqueue order; at no point do two prompts run.
    let mut completed = Vec::new();
    for _ in 0..3 {
        let message_id = bridge
            .complete_next_prompt()
            .await
            .expect("next prompt dispatched");
        completed.push(message_id);
    }
    assert_eq!(completed, vec![q1.message_id, q2.message_id, q3.message_id]);

    let (messages, _) = handle.list_messages(None, 10, None).await.unwrap();
    assert!(messages.iter().all(|m| m.status == MessageStatus::Completed));
}

// ---- Scenario 3: hibernation resumption ----

#[tokio::test]
async fn hibernation_resumption_recovers_sockets_and_tokens() {
    let harness = TestHarness::builder().build().await.unwrap();
    let handle = harness.create_session().await.unwrap();
    let session_id = handle.session_id().to_string();

    let (mut client, ws_token) = harness
        .connect_client(&handle, OWNER_USER_ID, "web-1")
        .await
        .unwrap();
    handle.warm().await.unwrap();
    let mut bridge = harness.connect_sandbox(&handle).await.unwrap();
    client
        .wait_for(|f| matches!(f, ServerFrame::SandboxReady))
        .await
        .expect("sandbox ready");

    // Evict the coordinator; sockets and the store survive.
    harness.router.evict(&session_id).await;

    // A reconnecting client subscribes with the previously-issued token.
    let resumed = harness.router.get(&session_id).await.unwrap();
    let mut reconnected = harness
        .connect_client_with_token(&resumed, &ws_token, "web-1")
        .await
        .expect("subscribe works without re-auth");
    let subscribed = reconnected
        .wait_for(|f| matches!(f, ServerFrame::Subscribed { .. }))
        .await
        .expect("subscribed after resume");
    if let ServerFrame::Subscribed { state, .. } = subscribed {
        // The state matches the pre-eviction session.
        assert_eq!(state["session"]["repo_owner"], "acme");
        assert_eq!(state["sandboxStatus"], "ready");
    }

    // The sandbox socket re-associates by tag: a new prompt dispatches over
    // the socket opened before eviction.
    let queued = resumed.enqueue_prompt(prompt("after resume")).await.unwrap();
    let command = bridge.recv_command().await.expect("prompt after resume");
    let SandboxCommand::Prompt { message_id, .. } = command else {
        panic!("expected prompt command");
    };
    assert_eq!(message_id, queued.message_id);

    // The pre-eviction client socket still receives broadcasts.
    client
        .wait_for(|f| matches!(f, ServerFrame::ProcessingStatus { is_processing: true }))
        .await
        .expect("old socket still in the fan-out");
}

// ---- Scenario 4: circuit breaker ----

#[tokio::test]
async fn circuit_breaker_suppresses_spawns_after_transient_failures() {
    let harness = TestHarness::builder()
        .with_create_failures(3)
        .with_breaker_max_failures(3)
        .build()
        .await
        .unwrap();
    let handle = harness.create_session().await.unwrap();
    let (mut client, _token) = harness
        .connect_client(&handle, OWNER_USER_ID, "web-1")
        .await
        .unwrap();

    // Three transient failures open the breaker.
    handle.enqueue_prompt(prompt("p1")).await.unwrap();
    handle.warm().await.unwrap();
    handle.warm().await.unwrap();
    assert_eq!(harness.provider.create_calls(), 3);

    // Warm during cooldown is rejected outright: no provider call.
    handle.warm().await.unwrap();
    assert_eq!(harness.provider.create_calls(), 3);

    // A prompt during cooldown surfaces sandbox_error and stays pending.
    handle.enqueue_prompt(prompt("p2")).await.unwrap();
    assert_eq!(harness.provider.create_calls(), 3);
    client
        .wait_for(|f| matches!(f, ServerFrame::SandboxError { .. }))
        .await
        .expect("sandbox_error during cooldown");

    let (messages, _) = handle.list_messages(None, 10, None).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.status == MessageStatus::Pending));
}

// ---- Scenario 5: push timeout ----

#[tokio::test]
async fn push_timeout_fails_pr_request_and_creates_nothing() {
    let harness = TestHarness::builder().with_push_timeout(1).build().await.unwrap();
    let handle = harness.create_session().await.unwrap();

    handle.warm().await.unwrap();
    let mut bridge = harness.connect_sandbox(&handle).await.unwrap();
    handle.enqueue_prompt(prompt("make a change")).await.unwrap();
    let _ = bridge.recv_command().await.expect("prompt dispatched");

    // Request the PR; the sandbox receives the push but never answers.
    let pr_handle = handle.clone();
    let pr_task = tokio::spawn(async move { pr_handle.create_pr(PrOrigin::Service).await });

    let push = bridge.recv_command().await.expect("push command");
    assert!(matches!(push, SandboxCommand::Push { .. }));

    let result = pr_task.await.unwrap();
    let err = result.expect_err("push should time out");
    let message = err.to_string();
    assert!(message.contains("Failed to push branch"), "got: {message}");
    assert!(message.contains("timed out"), "got: {message}");

    // No artifact, no branch.
    assert!(handle.list_artifacts().await.unwrap().is_empty());
    let state = handle.state().await.unwrap();
    assert!(state.session.branch_name.is_none());
    assert!(harness.repo_host.created_prs().is_empty());
}

// ---- Scenario 6: sandbox-authenticated PR ----

#[tokio::test]
async fn sandbox_authenticated_pr_uses_prompting_user_token() {
    let harness = TestHarness::builder().build().await.unwrap();
    let handle = harness.create_session().await.unwrap();

    handle.warm().await.unwrap();
    let mut bridge = harness.connect_sandbox(&handle).await.unwrap();
    handle.enqueue_prompt(prompt("add feature")).await.unwrap();
    let _ = bridge.recv_command().await.expect("prompt dispatched");

    let sandbox = harness
        .read_sandbox(handle.session_id())
        .await
        .unwrap()
        .unwrap();

    // A wrong bearer is refused.
    let err = handle
        .create_pr(PrOrigin::SandboxToken("wrong-token".to_string()))
        .await
        .expect_err("bad sandbox token");
    assert!(matches!(err, DrydockError::Unauthenticated(_)));

    // The real bearer drives the full push/PR dance.
    let pr_handle = handle.clone();
    let auth_token = sandbox.auth_token.clone();
    let pr_task =
        tokio::spawn(async move { pr_handle.create_pr(PrOrigin::SandboxToken(auth_token)).await });

    let push = bridge.recv_command().await.expect("push command");
    let SandboxCommand::Push {
        branch_name,
        github_token,
        ..
    } = push
    else {
        panic!("expected push command");
    };
    // The push carries the short-lived installation token...
    assert_eq!(
        github_token.as_deref(),
        Some(drydock_test_utils::mock_repo_host::MOCK_INSTALLATION_TOKEN)
    );

    bridge
        .send_event(SandboxEvent::PushComplete {
            // Case/whitespace variation in the event payload is tolerated.
            branch_name: format!(" {} ", branch_name.to_uppercase()),
        })
        .await;

    let created = pr_task.await.unwrap().expect("PR created");
    assert_eq!(created.branch, branch_name);
    assert!(created.url.contains("/pull/"));

    // ...but PR authorship used the prompting user's own token.
    let prs = harness.repo_host.created_prs();
    assert_eq!(prs.len(), 1);
    assert_eq!(prs[0].1, OWNER_ACCESS_TOKEN);
    assert_eq!(prs[0].0.base, "main");
    assert_eq!(prs[0].0.head, branch_name);

    // Artifact persisted, branch recorded.
    let artifacts = handle.list_artifacts().await.unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].artifact_type, "pull_request");
    let state = handle.state().await.unwrap();
    assert_eq!(state.session.branch_name.as_deref(), Some(branch_name.as_str()));
}

// ---- Boundary behaviors ----

#[tokio::test]
async fn stop_with_no_running_message_is_a_noop() {
    let harness = TestHarness::builder().build().await.unwrap();
    let handle = harness.create_session().await.unwrap();

    handle.stop_execution().await.expect("stop is a no-op 200");

    let (messages, _) = handle.list_messages(None, 10, None).await.unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn pr_without_processing_message_is_a_logical_error() {
    let harness = TestHarness::builder().build().await.unwrap();
    let handle = harness.create_session().await.unwrap();

    let err = handle.create_pr(PrOrigin::Service).await.unwrap_err();
    assert!(matches!(err, DrydockError::Logical(_)), "got: {err:?}");
}

#[tokio::test]
async fn stopped_sandbox_refuses_connections_with_gone() {
    let harness = TestHarness::builder().build().await.unwrap();
    let handle = harness.create_session().await.unwrap();
    let session_id = handle.session_id().to_string();

    handle.warm().await.unwrap();
    let sandbox = harness.read_sandbox(&session_id).await.unwrap().unwrap();

    // Force the persisted status to stopped, then resume a fresh actor.
    harness.set_sandbox_status(&session_id, SandboxStatus::Stopped).await;
    harness.router.evict(&session_id).await;
    let resumed = harness.router.get(&session_id).await.unwrap();

    let err = resumed
        .validate_sandbox(&sandbox.auth_token, &sandbox.id)
        .await
        .expect_err("stopped sandbox must refuse");
    assert!(matches!(err, DrydockError::Gone(_)), "got: {err:?}");
}

#[tokio::test]
async fn regenerating_ws_token_invalidates_the_old_one() {
    let harness = TestHarness::builder().build().await.unwrap();
    let handle = harness.create_session().await.unwrap();

    let old_token = handle.mint_ws_token(OWNER_USER_ID).await.unwrap();
    let new_token = handle.mint_ws_token(OWNER_USER_ID).await.unwrap();
    assert_ne!(old_token, new_token);

    let err = harness
        .connect_client_with_token(&handle, &old_token, "web-1")
        .await
        .expect_err("old token stops validating");
    assert!(matches!(err, DrydockError::Unauthenticated(_)));

    harness
        .connect_client_with_token(&handle, &new_token, "web-1")
        .await
        .expect("new token validates");
}

#[tokio::test]
async fn duplicate_subscribe_is_idempotent() {
    let harness = TestHarness::builder().build().await.unwrap();
    let handle = harness.create_session().await.unwrap();

    let (mut client, token) = harness
        .connect_client(&handle, OWNER_USER_ID, "web-1")
        .await
        .unwrap();
    client
        .wait_for(|f| matches!(f, ServerFrame::Subscribed { .. }))
        .await
        .unwrap();

    // Same socket subscribes again: re-asserted, not rejected.
    handle
        .subscribe(&client.ws_id, &token, "web-1")
        .await
        .expect("duplicate subscribe succeeds");
    client
        .wait_for(|f| matches!(f, ServerFrame::Subscribed { .. }))
        .await
        .expect("subscribed re-sent");
}

#[tokio::test]
async fn event_pagination_cursor_walks_the_stream() {
    let harness = TestHarness::builder().build().await.unwrap();
    let handle = harness.create_session().await.unwrap();

    handle.warm().await.unwrap();
    let bridge = harness.connect_sandbox(&handle).await.unwrap();
    for i in 0..5 {
        bridge
            .send_event(SandboxEvent::Token {
                content: format!("chunk {i}"),
                message_id: None,
            })
            .await;
        // Distinct created_at values keep the cursor unambiguous.
        tokio::time::sleep(std::time::Duration::from_millis(3)).await;
    }

    let (page1, has_more) = handle
        .list_events(None, 2, Some(EventType::Token), None)
        .await
        .unwrap();
    assert_eq!(page1.len(), 2);
    assert!(has_more);

    let cursor = page1.last().unwrap().created_at;
    let (page2, has_more) = handle
        .list_events(Some(cursor), 10, Some(EventType::Token), None)
        .await
        .unwrap();
    assert_eq!(page2.len(), 3);
    assert!(!has_more);
}

#[tokio::test]
async fn snapshot_trigger_is_idempotent_while_in_flight() {
    let harness = TestHarness::builder().build().await.unwrap();
    let handle = harness.create_session().await.unwrap();

    handle.warm().await.unwrap();
    let _bridge = harness.connect_sandbox(&handle).await.unwrap();
    let (mut client, _token) = harness
        .connect_client(&handle, OWNER_USER_ID, "web-1")
        .await
        .unwrap();

    // Two back-to-back triggers; the second lands while the first is still
    // in flight and must be a no-op.
    handle
        .trigger_snapshot(drydock_core::types::SnapshotReason::Manual)
        .await
        .unwrap();
    handle
        .trigger_snapshot(drydock_core::types::SnapshotReason::Manual)
        .await
        .unwrap();

    client
        .wait_for(|f| matches!(f, ServerFrame::SnapshotSaved { .. }))
        .await
        .expect("snapshot completes");
    assert_eq!(harness.provider.snapshot_calls(), 1);

    // The sandbox returned to its prior status and is usable again.
    let state = handle.state().await.unwrap();
    assert_eq!(state.sandbox_status, Some(SandboxStatus::Ready));
}

#[tokio::test]
async fn git_sync_parks_dispatch_until_completion() {
    let harness = TestHarness::builder().build().await.unwrap();
    let handle = harness.create_session().await.unwrap();

    handle.warm().await.unwrap();
    let mut bridge = harness.connect_sandbox(&handle).await.unwrap();

    // The bridge starts syncing the repo; prompts must wait.
    bridge
        .send_event(SandboxEvent::GitSync {
            status: drydock_core::types::GitSyncStatus::InProgress,
            sha: None,
        })
        .await;
    handle.enqueue_prompt(prompt("early prompt")).await.unwrap();
    assert!(
        bridge.recv_command().await.is_none(),
        "no dispatch while syncing"
    );

    bridge
        .send_event(SandboxEvent::GitSync {
            status: drydock_core::types::GitSyncStatus::Completed,
            sha: Some("abc123".to_string()),
        })
        .await;
    let command = bridge.recv_command().await.expect("dispatch after sync");
    assert!(matches!(command, SandboxCommand::Prompt { .. }));

    // The first synced commit is both base and current.
    let state = handle.state().await.unwrap();
    assert_eq!(state.session.base_sha.as_deref(), Some("abc123"));
    assert_eq!(state.session.current_sha.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn lost_heartbeat_marks_stale_and_recovery_restores_ready() {
    let harness = TestHarness::builder()
        .with_heartbeat_threshold(1)
        .build()
        .await
        .unwrap();
    let handle = harness.create_session().await.unwrap();
    let (mut client, _token) = harness
        .connect_client(&handle, OWNER_USER_ID, "web-1")
        .await
        .unwrap();

    handle.warm().await.unwrap();
    let bridge = harness.connect_sandbox(&handle).await.unwrap();

    // No heartbeats arrive; the threshold passes and the alarm fires.
    client
        .wait_for(|f| matches!(f, ServerFrame::SandboxStatus { status: SandboxStatus::Stale }))
        .await
        .expect("stale broadcast");

    // A late heartbeat brings it back: stale is observational, not terminal.
    bridge
        .send_event(SandboxEvent::Heartbeat {
            sandbox_id: None,
            status: Some("ready".to_string()),
            timestamp: None,
        })
        .await;
    client
        .wait_for(|f| matches!(f, ServerFrame::SandboxStatus { status: SandboxStatus::Ready }))
        .await
        .expect("ready again after heartbeat");
}

// ---- helpers ----

fn prompt(content: &str) -> drydock_coordinator::EnqueuePromptRequest {
    drydock_coordinator::EnqueuePromptRequest {
        user_id: OWNER_USER_ID.to_string(),
        content: content.to_string(),
        source: drydock_core::types::MessageSource::Web,
        model: None,
        attachments: None,
        callback_context: None,
    }
}
