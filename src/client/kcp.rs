// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Control-plane runtime API client.
//!
//! The runtime status lists operations per type. Each entry is either a single
//! operation or a page `{data: [...]}`; the latest one is the most recently
//! created, or the first listed when creation times are missing. Entries in
//! states outside the operation lifecycle (`canceled`, `retrying`, ...) and
//! unknown operation types are left out instead of failing the whole page.

use crate::client::{error_from_response, LatestOperationSource, TokenCache};
use crate::config::KcpConfig;
use crate::constants::timeouts;
use crate::error::ApiError;
use crate::types::{Operation, OperationState, OperationType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

#[derive(Deserialize, Debug)]
struct RuntimesPage {
    #[serde(default)]
    data: Vec<RuntimeDto>,
}

#[derive(Deserialize, Debug)]
struct RuntimeDto {
    #[serde(default)]
    status: serde_json::Map<String, Value>,
}

/// Runtime API view of an operation; `type` is implied by the status key.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OperationDto {
    #[serde(rename = "operationID")]
    id: String,
    #[serde(rename = "instanceID", default)]
    instance_id: String,
    state: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl OperationDto {
    fn into_operation(self, operation_type: OperationType) -> Option<Operation> {
        let Ok(state) = self.state.parse::<OperationState>() else {
            debug!("Ignoring operation {} in state '{}'", self.id, self.state);
            return None;
        };
        Some(Operation {
            id: self.id,
            instance_id: self.instance_id,
            operation_type: Some(operation_type),
            state,
            description: self.description,
            created_at: self.created_at,
        })
    }
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum OperationsEntry {
    Page { data: Vec<OperationDto> },
    Single(OperationDto),
}

pub struct KcpClient {
    http: reqwest::Client,
    api_url: Url,
    token: TokenCache,
}

impl KcpClient {
    pub fn new(config: KcpConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeouts::HTTP_REQUEST)
            .build()?;
        let token = TokenCache::new(http.clone(), config.oauth, None);
        Ok(Self {
            http,
            api_url: config.api_url,
            token,
        })
    }

    fn runtimes_url(&self, instance_id: &str) -> Result<Url, ApiError> {
        let mut url = Url::parse(&format!(
            "{}/runtimes",
            self.api_url.as_str().trim_end_matches('/')
        ))
        .map_err(|e| ApiError::Unexpected(format!("invalid runtime API url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("instance_id", instance_id)
            .append_pair("op_detail", "all");
        Ok(url)
    }
}

#[async_trait]
impl LatestOperationSource for KcpClient {
    #[instrument(skip(self))]
    async fn latest_operation(
        &self,
        instance_id: &str,
        operation_type: OperationType,
    ) -> Result<Option<Operation>, ApiError> {
        let url = self.runtimes_url(instance_id)?;
        let token = self.token.token().await?;
        debug!("GET {}", url);
        let response = self.http.get(url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let page: RuntimesPage = response.json().await?;
        let Some(runtime) = page.data.into_iter().next() else {
            return Ok(None);
        };
        latest_from_status(&runtime.status, instance_id, operation_type)
    }
}

/// Pick the latest operation of a type from a runtime status object.
fn latest_from_status(
    status: &serde_json::Map<String, Value>,
    instance_id: &str,
    operation_type: OperationType,
) -> Result<Option<Operation>, ApiError> {
    let entry = match status.get(operation_type.status_key()) {
        None | Some(Value::Null) => return Ok(None),
        Some(entry) => entry.clone(),
    };
    let entry: OperationsEntry = serde_json::from_value(entry).map_err(|e| {
        ApiError::Unexpected(format!(
            "invalid {} status: {e}",
            operation_type.status_key()
        ))
    })?;

    let operations: Vec<Operation> = match entry {
        OperationsEntry::Page { data } => data,
        OperationsEntry::Single(op) => vec![op],
    }
    .into_iter()
    .filter_map(|op| op.into_operation(operation_type))
    .collect();

    let latest = if operations.iter().all(|op| op.created_at.is_some()) {
        operations.into_iter().max_by_key(|op| op.created_at)
    } else {
        operations.into_iter().next()
    };

    Ok(latest.map(|mut op| {
        if op.instance_id.is_empty() {
            op.instance_id = instance_id.to_string();
        }
        op
    }))
}
