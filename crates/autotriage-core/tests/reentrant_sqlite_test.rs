// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reentrant operations checkpointed in a file-backed SQLite store.
//!
//! Each tick opens the store again, the way a restarted host process would.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use autotriage_core::{
    CancellationToken, CheckpointState, CheckpointStore, CheckpointStoreExt, ExecutionResult,
    ExecutionStatus, ReentrantOperation, Result, SqliteCheckpointStore, StateKey,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollState {
    status: ExecutionStatus,
    polls: u32,
}

impl CheckpointState for PollState {
    fn status(&self) -> ExecutionStatus {
        self.status
    }

    fn record(&mut self, result: &ExecutionResult) {
        self.status = result.status;
    }
}

/// Polls an external job that finishes on the third poll.
struct PollJob {
    store: SqliteCheckpointStore,
    work: AtomicU32,
}

impl PollJob {
    async fn open(path: &Path) -> Self {
        Self {
            store: SqliteCheckpointStore::from_path(path).await.unwrap(),
            work: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ReentrantOperation for PollJob {
    type Request = String;
    type State = PollState;

    fn operation_name(&self) -> &str {
        "poll-job"
    }

    fn checkpoint_store(&self) -> &dyn CheckpointStore {
        &self.store
    }

    fn state_key(&self, experiment_id: &String) -> StateKey {
        StateKey::new(experiment_id.clone(), format!("{}-poll", experiment_id)).with_sub_id("job-1")
    }

    fn initial_state(&self, _experiment_id: &String) -> PollState {
        PollState {
            status: ExecutionStatus::InProgress,
            polls: 0,
        }
    }

    async fn execute_tick(
        &self,
        _experiment_id: &String,
        state: &mut PollState,
        _cancellation: &CancellationToken,
    ) -> Result<ExecutionResult> {
        self.work.fetch_add(1, Ordering::SeqCst);
        state.polls += 1;
        if state.polls >= 3 {
            Ok(ExecutionResult::succeeded())
        } else {
            Ok(ExecutionResult::in_progress())
        }
    }
}

#[tokio::test]
async fn test_progress_survives_reopening_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("checkpoints.db");
    let experiment = "exp-1".to_string();
    let token = CancellationToken::new();

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let job = PollJob::open(&path).await;
        statuses.push(job.run(&experiment, &token).await.unwrap().status);
    }

    assert_eq!(
        statuses,
        vec![
            ExecutionStatus::InProgress,
            ExecutionStatus::InProgress,
            ExecutionStatus::Succeeded,
            ExecutionStatus::Succeeded,
        ]
    );

    let job = PollJob::open(&path).await;
    let state: PollState = job
        .store
        .get_state(&job.state_key(&experiment))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.polls, 3);
    assert_eq!(state.status, ExecutionStatus::Succeeded);
}

#[tokio::test]
async fn test_completed_state_is_not_reworked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoints.db");
    let experiment = "exp-2".to_string();
    let token = CancellationToken::new();

    let job = PollJob::open(&path).await;
    for _ in 0..5 {
        job.run(&experiment, &token).await.unwrap();
    }

    assert_eq!(job.work.load(Ordering::SeqCst), 3);
    assert_eq!(job.store.count_for_subject("exp-2").await.unwrap(), 1);
}
