// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::client::OperationStatusSource;
use crate::error::WaitError;
use crate::types::{Operation, OperationState};
use crate::wait::Deadline;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Polls an operation by id until it reaches a terminal state.
pub struct OperationPoller<'a> {
    source: &'a dyn OperationStatusSource,
    interval: Duration,
}

impl<'a> OperationPoller<'a> {
    pub fn new(source: &'a dyn OperationStatusSource, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// Wait until the operation succeeds or fails and return it.
    ///
    /// A failed operation is a result, not an error. Transient source errors
    /// are retried until the deadline; the state reported back never moves
    /// backwards even if the source briefly does.
    #[instrument(skip(self))]
    pub async fn await_terminal(
        &self,
        instance_id: &str,
        operation_id: &str,
        timeout: Duration,
    ) -> Result<Operation, WaitError> {
        let deadline = Deadline::after(timeout);
        let mut last_state: Option<OperationState> = None;
        let mut answered = false;

        loop {
            let Some(remaining) = deadline.remaining() else {
                break;
            };

            match tokio::time::timeout(remaining, self.source.operation(instance_id, operation_id))
                .await
            {
                Err(_) => {
                    debug!("Query still in flight at the deadline, dropping it");
                    break;
                }
                Ok(Ok(Some(mut operation))) => {
                    answered = true;
                    let state = last_state.map_or(operation.state, |s| s.latch(operation.state));
                    if state != operation.state {
                        debug!(
                            "Ignoring regressed state '{}', keeping '{}'",
                            operation.state, state
                        );
                    }
                    last_state = Some(state);
                    if state.is_terminal() {
                        operation.state = state;
                        info!(
                            "Operation {} finished with state '{}' after {:?}",
                            operation_id,
                            state,
                            deadline.elapsed()
                        );
                        return Ok(operation);
                    }
                    info!("Operation {} is '{}'", operation_id, state);
                }
                Ok(Ok(None)) => {
                    answered = true;
                    debug!("Operation {} not known yet", operation_id);
                }
                Ok(Err(e)) if e.is_transient() => {
                    warn!("Polling operation {} failed, retrying: {}", operation_id, e);
                }
                Ok(Err(e)) => return Err(WaitError::Source(e)),
            }

            if !deadline.sleep(self.interval).await {
                break;
            }
        }

        let elapsed = deadline.elapsed();
        if answered && last_state.is_none() {
            return Err(WaitError::OperationNotFound {
                instance_id: instance_id.to_string(),
                operation_id: operation_id.to_string(),
                elapsed,
            });
        }
        Err(WaitError::Timeout {
            subject: format!("operation {operation_id} of instance {instance_id}"),
            elapsed,
            last_state,
        })
    }
}
