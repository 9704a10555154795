// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::client::LatestOperationSource;
use crate::error::WaitError;
use crate::types::{Operation, OperationState, OperationType};
use crate::wait::Deadline;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Waits for the most recent operation of a type to reach a given state.
///
/// Used when the operation is started by the control plane itself (e.g. a
/// scheduled suspension) and its id is not known up front.
pub struct LatestOperationWaiter<'a> {
    source: &'a dyn LatestOperationSource,
    interval: Duration,
}

impl<'a> LatestOperationWaiter<'a> {
    pub fn new(source: &'a dyn LatestOperationSource, interval: Duration) -> Self {
        Self { source, interval }
    }

    #[instrument(skip(self))]
    pub async fn await_state(
        &self,
        instance_id: &str,
        operation_type: OperationType,
        target_state: OperationState,
        timeout: Duration,
    ) -> Result<Operation, WaitError> {
        let deadline = Deadline::after(timeout);
        let mut last: Option<(String, OperationState)> = None;

        loop {
            let Some(remaining) = deadline.remaining() else {
                break;
            };

            match tokio::time::timeout(
                remaining,
                self.source.latest_operation(instance_id, operation_type),
            )
            .await
            {
                Err(_) => break,
                Ok(Ok(Some(operation))) => {
                    // a newer operation restarts the monotonic view
                    let state = match &last {
                        Some((id, previous)) if *id == operation.id => {
                            previous.latch(operation.state)
                        }
                        _ => operation.state,
                    };
                    last = Some((operation.id.clone(), state));
                    if state == target_state {
                        info!(
                            "Latest {} operation {} reached '{}' after {:?}",
                            operation_type,
                            operation.id,
                            target_state,
                            deadline.elapsed()
                        );
                        return Ok(Operation {
                            state,
                            ..operation
                        });
                    }
                    info!(
                        "Latest {} operation {} is '{}', waiting for '{}'",
                        operation_type, operation.id, state, target_state
                    );
                }
                Ok(Ok(None)) => {
                    debug!("No {} operation yet", operation_type);
                }
                Ok(Err(e)) if e.is_transient() => {
                    warn!("Fetching latest {} operation failed, retrying: {}", operation_type, e);
                }
                Ok(Err(e)) => return Err(WaitError::Source(e)),
            }

            if !deadline.sleep(self.interval).await {
                break;
            }
        }

        let mut subject = format!(
            "latest {operation_type} operation of instance {instance_id} to be '{target_state}'"
        );
        if let Some((id, _)) = &last {
            subject.push_str(&format!(" (last seen operation {id})"));
        }
        Err(WaitError::Timeout {
            subject,
            elapsed: deadline.elapsed(),
            last_state: last.map(|(_, state)| state),
        })
    }
}
