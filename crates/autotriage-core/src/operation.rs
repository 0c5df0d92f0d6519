// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reentrant operation contract.
//!
//! A reentrant operation may need many invocations ("ticks") before it reaches
//! a completed status. Each tick:
//!
//! 1. loads the operation's checkpoint, or synthesizes an initial state;
//! 2. short-circuits with the persisted outcome if that state is completed;
//! 3. otherwise performs one bounded unit of work;
//! 4. persists the state whether or not the work succeeded;
//! 5. returns a result whose status matches the persisted state.
//!
//! The caller re-invokes while the status is non-completed, waiting for the
//! extension picked by [`combine_extension`](crate::result::combine_extension).

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::checkpoint::{CheckpointStore, CheckpointStoreExt, StateKey};
use crate::error::Result;
use crate::result::{ExecutionResult, ExecutionStatus};

/// State persisted between ticks of a reentrant operation.
pub trait CheckpointState: Serialize + DeserializeOwned + Send + Sync {
    /// Status of the last completed tick.
    fn status(&self) -> ExecutionStatus;

    /// Fold the outcome of a tick into the state.
    fn record(&mut self, result: &ExecutionResult);

    /// Result returned when a completed state short-circuits a tick.
    fn replay(&self) -> ExecutionResult {
        ExecutionResult::new(self.status())
    }
}

/// A unit of work executed over many invocations against persisted state.
#[async_trait]
pub trait ReentrantOperation: Send + Sync {
    /// Input of one invocation.
    type Request: Send + Sync;
    /// Checkpointed state.
    type State: CheckpointState;

    /// Name used in logs.
    fn operation_name(&self) -> &str;

    /// Store holding this operation's checkpoints.
    fn checkpoint_store(&self) -> &dyn CheckpointStore;

    /// Where the state for `request` lives. Must not collide with any other
    /// operation's key.
    fn state_key(&self, request: &Self::Request) -> StateKey;

    /// State used when no checkpoint exists yet.
    fn initial_state(&self, request: &Self::Request) -> Self::State;

    /// Perform one bounded unit of work.
    ///
    /// The returned result is recorded into `state` by the caller; an
    /// implementation may additionally mutate `state` itself.
    async fn execute_tick(
        &self,
        request: &Self::Request,
        state: &mut Self::State,
        cancellation: &CancellationToken,
    ) -> Result<ExecutionResult>;

    /// Run one tick under the reentrant contract.
    async fn run(
        &self,
        request: &Self::Request,
        cancellation: &CancellationToken,
    ) -> Result<ExecutionResult> {
        run_tick(self, request, cancellation).await
    }
}

/// Execute one tick of `operation`. See the module docs for the contract.
///
/// Checkpoint load and save failures propagate. When both the work and the
/// save fail, the work's error is returned and the save failure is logged.
pub async fn run_tick<O>(
    operation: &O,
    request: &O::Request,
    cancellation: &CancellationToken,
) -> Result<ExecutionResult>
where
    O: ReentrantOperation + ?Sized,
{
    let store = operation.checkpoint_store();
    let key = operation.state_key(request);

    let mut state: O::State = store
        .get_or_create_with(&key, || operation.initial_state(request))
        .await?;

    if state.status().is_completed() {
        debug!(
            operation = operation.operation_name(),
            key = %key,
            status = %state.status(),
            "Checkpoint already completed, skipping work"
        );
        return Ok(state.replay());
    }

    let outcome = operation
        .execute_tick(request, &mut state, cancellation)
        .await;

    if let Ok(result) = &outcome {
        state.record(result);
    }

    let saved = store.save_state(&key, &state).await;

    match (outcome, saved) {
        (Ok(result), Ok(())) => Ok(result),
        (Ok(_), Err(save_error)) => Err(save_error.into()),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(save_error)) => {
            warn!(
                operation = operation.operation_name(),
                key = %key,
                error = %save_error,
                "Failed to persist checkpoint after failed tick"
            );
            Err(error)
        }
    }
}
