// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of asynchronous lifecycle action running against an instance.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Provision,
    Deprovision,
    Suspension,
    Unsuspension,
}

impl OperationType {
    /// Key under which the runtime status groups operations of this type
    pub fn status_key(self) -> &'static str {
        match self {
            OperationType::Provision => "provisioning",
            OperationType::Deprovision => "deprovisioning",
            OperationType::Suspension => "suspension",
            OperationType::Unsuspension => "unsuspension",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationType::Provision => "provision",
            OperationType::Deprovision => "deprovision",
            OperationType::Suspension => "suspension",
            OperationType::Unsuspension => "unsuspension",
        };
        f.write_str(name)
    }
}

/// Observable state of an operation. Progress only moves forward:
/// `pending -> in progress -> succeeded | failed`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationState {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Succeeded | OperationState::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            OperationState::Pending => 0,
            OperationState::InProgress => 1,
            OperationState::Succeeded | OperationState::Failed => 2,
        }
    }

    /// Returns the more advanced of two observations.
    ///
    /// A terminal observation is never replaced, not even by the other
    /// terminal state.
    pub fn latch(self, next: OperationState) -> OperationState {
        if self.is_terminal() || next.rank() < self.rank() {
            self
        } else {
            next
        }
    }
}

impl FromStr for OperationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OperationState::Pending),
            "in progress" => Ok(OperationState::InProgress),
            "succeeded" => Ok(OperationState::Succeeded),
            "failed" => Ok(OperationState::Failed),
            other => Err(format!("unknown operation state '{other}'")),
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationState::Pending => "pending",
            OperationState::InProgress => "in progress",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A single observation of an operation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(rename = "operationID")]
    pub id: String,
    #[serde(rename = "instanceID", default)]
    pub instance_id: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub operation_type: Option<OperationType>,
    pub state: OperationState,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created_at: Option<DateTime<Utc>>,
}
