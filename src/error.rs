// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::types::operation::OperationState;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the broker and control-plane clients.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// A 4xx answer other than 404/410, e.g. a range, quota or conflict violation.
    #[error("request rejected with status {status}: {description}")]
    Rejected { status: u16, description: String },

    #[error("not found: {description}")]
    NotFound { description: String },

    #[error("gone: {description}")]
    Gone { description: String },

    #[error("server error {status}: {description}")]
    Server { status: u16, description: String },

    /// No HTTP response was received at all.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl ApiError {
    /// Build the error matching a non-success HTTP status.
    pub fn from_status(status: u16, description: impl Into<String>) -> Self {
        let description = description.into();
        match status {
            404 => ApiError::NotFound { description },
            410 => ApiError::Gone { description },
            400..=499 => ApiError::Rejected {
                status,
                description,
            },
            500..=599 => ApiError::Server {
                status,
                description,
            },
            _ => ApiError::Unexpected(format!("status {status}: {description}")),
        }
    }

    /// Errors worth retrying while polling: no response, or a 5xx.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::Server { .. })
    }

    /// HTTP status carried by the error, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } | ApiError::Server { status, .. } => Some(*status),
            ApiError::NotFound { .. } => Some(404),
            ApiError::Gone { .. } => Some(410),
            ApiError::Transport(_) | ApiError::Unexpected(_) => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Unexpected(format!("could not decode response: {err}"))
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Errors raised while waiting for an operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    #[error("timed out after {elapsed:?} waiting for {subject}, last observed state: {}", display_state(.last_state))]
    Timeout {
        subject: String,
        elapsed: Duration,
        last_state: Option<OperationState>,
    },

    #[error("operation {operation_id} of instance {instance_id} was not found within {elapsed:?}")]
    OperationNotFound {
        instance_id: String,
        operation_id: String,
        elapsed: Duration,
    },

    #[error("operation status source failed: {0}")]
    Source(#[from] ApiError),
}

fn display_state(state: &Option<OperationState>) -> String {
    state
        .map(|s| s.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Errors raised by the quota probe. Every variant carries the ids created
/// before the failure so the caller can clean them up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("quota not enforced: {attempts} creates succeeded without a rejection")]
    QuotaNotEnforced {
        attempts: usize,
        created_ids: Vec<String>,
    },

    #[error("attempt {attempt} was rejected for another reason ({status}): {description}")]
    UnexpectedRejection {
        attempt: usize,
        status: u16,
        description: String,
        created_ids: Vec<String>,
    },

    #[error("attempt {attempt} failed: {source}")]
    Api {
        attempt: usize,
        source: ApiError,
        created_ids: Vec<String>,
    },
}

impl ProbeError {
    pub fn created_ids(&self) -> &[String] {
        match self {
            ProbeError::QuotaNotEnforced { created_ids, .. }
            | ProbeError::UnexpectedRejection { created_ids, .. }
            | ProbeError::Api { created_ids, .. } => created_ids,
        }
    }
}

/// Scenario level error, the failure a test run reports.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error("quota probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("operation {operation_id} failed: {description}")]
    OperationFailed {
        operation_id: String,
        description: String,
    },

    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("Failed to parse kubeconfig: {0}")]
    Kubeconfig(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

pub type Result<T> = std::result::Result<T, ScenarioError>;
