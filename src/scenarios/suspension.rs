// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Trial instances are suspended by a scheduled cleanup job. The scenario
//! waits for the job to start a suspension and then for it to finish.

use crate::constants::timeouts;
use crate::context::TestContext;
use crate::error::{Result, ScenarioError};
use crate::scenarios::instance::ensure_operation_succeeded;
use crate::types::{Operation, OperationState, OperationType};
use tracing::{info, instrument};

#[instrument(skip(ctx), fields(instance_id = %ctx.instance_id))]
pub async fn trial_suspension(ctx: &TestContext) -> Result<Operation> {
    let waiter = ctx.latest_waiter().ok_or_else(|| {
        ScenarioError::Assertion("control-plane runtime API is not configured".to_string())
    })?;

    info!("Waiting until the trial cleanup job triggers a suspension...");
    let suspension = waiter
        .await_state(
            &ctx.instance_id,
            OperationType::Suspension,
            OperationState::InProgress,
            timeouts::TRIAL_CLEANUP_TRIGGER,
        )
        .await?;

    info!("Waiting until suspension {} succeeds...", suspension.id);
    ensure_operation_succeeded(ctx, &suspension.id, timeouts::SUSPENSION).await
}
