// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::timeouts;
use crate::context::TestContext;
use crate::error::{Result, ScenarioError};
use crate::types::{Operation, OperationState};
use std::time::Duration;
use tracing::{error, info, instrument};

/// Wait for an operation to finish and require it to have succeeded.
#[instrument(skip(ctx), fields(instance_id = %ctx.instance_id))]
pub async fn ensure_operation_succeeded(
    ctx: &TestContext,
    operation_id: &str,
    timeout: Duration,
) -> Result<Operation> {
    let operation = ctx
        .poller()
        .await_terminal(&ctx.instance_id, operation_id, timeout)
        .await?;

    if operation.state != OperationState::Succeeded {
        let description = operation
            .description
            .clone()
            .unwrap_or_else(|| "no description".to_string());
        error!("Operation {} failed: {}", operation_id, description);
        return Err(ScenarioError::OperationFailed {
            operation_id: operation_id.to_string(),
            description,
        });
    }
    Ok(operation)
}

/// Provision the instance under test and wait until it is ready.
#[instrument(skip(ctx), fields(instance_id = %ctx.instance_id))]
pub async fn provision(ctx: &TestContext, name: &str) -> Result<Operation> {
    let operation_id = ctx.instances.provision(&ctx.instance_id, name).await?;
    info!("Provisioning started, operation {}", operation_id);
    ensure_operation_succeeded(ctx, &operation_id, timeouts::PROVISIONING).await
}

/// Deprovision the instance under test and wait until it is gone.
#[instrument(skip(ctx), fields(instance_id = %ctx.instance_id))]
pub async fn deprovision(ctx: &TestContext, timeout: Duration) -> Result<Operation> {
    let operation_id = ctx.instances.deprovision(&ctx.instance_id).await?;
    info!("Deprovisioning started, operation {}", operation_id);
    ensure_operation_succeeded(ctx, &operation_id, timeout).await
}
