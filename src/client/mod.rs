// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Clients for the broker and the control plane, and the capabilities the
//! wait and probe primitives consume.

pub mod broker;
pub mod kcp;
pub mod oauth;

use crate::error::ApiError;
use crate::types::{Binding, BindingParameters, CreateOutcome, Operation, OperationType};
use async_trait::async_trait;
use serde::Deserialize;

pub use broker::KebClient;
pub use kcp::KcpClient;
pub use oauth::TokenCache;

/// Looks up an operation by id.
#[async_trait]
pub trait OperationStatusSource: Send + Sync {
    /// `Ok(None)` when the source does not know the operation (yet).
    async fn operation(
        &self,
        instance_id: &str,
        operation_id: &str,
    ) -> Result<Option<Operation>, ApiError>;
}

/// Looks up the most recent operation of a type.
#[async_trait]
pub trait LatestOperationSource: Send + Sync {
    /// `Ok(None)` when no operation of that type exists yet.
    async fn latest_operation(
        &self,
        instance_id: &str,
        operation_type: OperationType,
    ) -> Result<Option<Operation>, ApiError>;
}

#[async_trait]
pub trait BindingApi: Send + Sync {
    async fn create_binding(
        &self,
        instance_id: &str,
        binding_id: &str,
        parameters: &BindingParameters,
    ) -> Result<CreateOutcome, ApiError>;

    async fn get_binding(&self, instance_id: &str, binding_id: &str)
        -> Result<Binding, ApiError>;

    async fn delete_binding(&self, instance_id: &str, binding_id: &str) -> Result<(), ApiError>;
}

/// Instance level calls, each returns the id of the started operation.
#[async_trait]
pub trait InstanceApi: Send + Sync {
    async fn provision(&self, instance_id: &str, name: &str) -> Result<String, ApiError>;

    async fn deprovision(&self, instance_id: &str) -> Result<String, ApiError>;
}

/// Error body returned by both APIs
#[derive(Deserialize, Debug, Default)]
struct ErrorBody {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Turn a non-success response into an [ApiError], keeping the server's
/// description when it sent one.
pub(crate) async fn error_from_response(response: reqwest::Response) -> ApiError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let description = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.description.or(b.message).or(b.error))
        .unwrap_or(text);
    ApiError::from_status(status, description)
}
