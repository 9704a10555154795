// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Open Service Broker API client for the environment broker.

use crate::client::{
    error_from_response, BindingApi, InstanceApi, OperationStatusSource, TokenCache,
};
use crate::config::KebConfig;
use crate::constants::{broker, timeouts};
use crate::error::ApiError;
use crate::types::{Binding, BindingParameters, CreateOutcome, Operation, OperationState};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};
use url::Url;

#[derive(Serialize, Debug)]
struct BindingRequest<'a> {
    service_id: &'a str,
    plan_id: &'a str,
    parameters: &'a BindingParameters,
}

#[derive(Deserialize, Debug)]
struct LastOperationResponse {
    state: OperationState,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OperationAccepted {
    operation: String,
}

pub struct KebClient {
    http: reqwest::Client,
    token: TokenCache,
    config: KebConfig,
}

impl KebClient {
    pub fn new(config: KebConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeouts::HTTP_REQUEST)
            .build()?;
        let token = TokenCache::new(http.clone(), config.oauth.clone(), Some(broker::TOKEN_SCOPE));
        Ok(Self {
            http,
            token,
            config,
        })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = self
            .config
            .api_url
            .join(path)
            .map_err(|e| ApiError::Unexpected(format!("invalid broker path '{path}': {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, ApiError> {
        let token = self.token.token().await?;
        debug!("{} {}", method, url);
        Ok(self
            .http
            .request(method, url)
            .header(broker::API_VERSION_HEADER, broker::API_VERSION)
            .bearer_auth(token))
    }

    fn binding_path(instance_id: &str, binding_id: &str) -> String {
        format!("service_instances/{instance_id}/service_bindings/{binding_id}")
    }

    async fn read_binding(
        response: reqwest::Response,
        instance_id: &str,
        binding_id: &str,
    ) -> Result<Binding, ApiError> {
        let mut binding: Binding = response.json().await?;
        binding.id = binding_id.to_string();
        binding.instance_id = instance_id.to_string();
        Ok(binding)
    }
}

#[async_trait]
impl BindingApi for KebClient {
    #[instrument(skip(self, parameters))]
    async fn create_binding(
        &self,
        instance_id: &str,
        binding_id: &str,
        parameters: &BindingParameters,
    ) -> Result<CreateOutcome, ApiError> {
        let url = self.url(
            &Self::binding_path(instance_id, binding_id),
            &[("accepts_incomplete", "false")],
        )?;
        let body = BindingRequest {
            service_id: broker::KYMA_SERVICE_ID,
            plan_id: &self.config.plan_id,
            parameters,
        };
        let response = self.request(Method::PUT, url).await?.json(&body).send().await?;

        match response.status() {
            StatusCode::CREATED => {
                info!("Binding {} created", binding_id);
                Ok(CreateOutcome::Created(
                    Self::read_binding(response, instance_id, binding_id).await?,
                ))
            }
            StatusCode::OK => {
                info!("Binding {} already exists", binding_id);
                Ok(CreateOutcome::Existing(
                    Self::read_binding(response, instance_id, binding_id).await?,
                ))
            }
            _ => Err(error_from_response(response).await),
        }
    }

    #[instrument(skip(self))]
    async fn get_binding(&self, instance_id: &str, binding_id: &str) -> Result<Binding, ApiError> {
        let url = self.url(
            &Self::binding_path(instance_id, binding_id),
            &[("accepts_incomplete", "false")],
        )?;
        let response = self.request(Method::GET, url).await?.send().await?;
        if response.status() != StatusCode::OK {
            return Err(error_from_response(response).await);
        }
        Self::read_binding(response, instance_id, binding_id).await
    }

    #[instrument(skip(self))]
    async fn delete_binding(&self, instance_id: &str, binding_id: &str) -> Result<(), ApiError> {
        let url = self.url(
            &Self::binding_path(instance_id, binding_id),
            &[
                ("accepts_incomplete", "false"),
                ("service_id", broker::KYMA_SERVICE_ID),
                ("plan_id", &self.config.plan_id),
            ],
        )?;
        let response = self.request(Method::DELETE, url).await?.send().await?;
        if response.status() != StatusCode::OK {
            return Err(error_from_response(response).await);
        }
        info!("Binding {} deleted", binding_id);
        Ok(())
    }
}

#[async_trait]
impl OperationStatusSource for KebClient {
    #[instrument(skip(self))]
    async fn operation(
        &self,
        instance_id: &str,
        operation_id: &str,
    ) -> Result<Option<Operation>, ApiError> {
        let url = self.url(
            &format!("service_instances/{instance_id}/last_operation"),
            &[("operation", operation_id)],
        )?;
        let response = self.request(Method::GET, url).await?.send().await?;

        let (state, description) = match response.status() {
            StatusCode::OK => {
                let body: LastOperationResponse = response.json().await?;
                (body.state, body.description)
            }
            StatusCode::NOT_FOUND => return Ok(None),
            // the instance is gone, a deprovisioning has finished
            StatusCode::GONE => (OperationState::Succeeded, None),
            _ => return Err(error_from_response(response).await),
        };

        Ok(Some(Operation {
            id: operation_id.to_string(),
            instance_id: instance_id.to_string(),
            operation_type: None,
            state,
            description,
            created_at: None,
        }))
    }
}

#[async_trait]
impl InstanceApi for KebClient {
    #[instrument(skip(self))]
    async fn provision(&self, instance_id: &str, name: &str) -> Result<String, ApiError> {
        let url = self.url(
            &format!("service_instances/{instance_id}"),
            &[("accepts_incomplete", "true")],
        )?;
        let mut parameters = json!({ "name": name });
        if self.config.plan_id != broker::TRIAL_PLAN_ID {
            if let Some(region) = &self.config.region {
                parameters["region"] = json!(region);
            }
        }
        let body = json!({
            "service_id": broker::KYMA_SERVICE_ID,
            "plan_id": self.config.plan_id,
            "context": {
                "globalaccount_id": self.config.global_account_id,
                "subaccount_id": self.config.subaccount_id,
                "user_id": self.config.user_id,
            },
            "parameters": parameters,
        });

        let response = self.request(Method::PUT, url).await?.json(&body).send().await?;
        accepted_operation(response).await
    }

    #[instrument(skip(self))]
    async fn deprovision(&self, instance_id: &str) -> Result<String, ApiError> {
        let url = self.url(
            &format!("service_instances/{instance_id}"),
            &[
                ("accepts_incomplete", "true"),
                ("service_id", broker::KYMA_SERVICE_ID),
                ("plan_id", &self.config.plan_id),
            ],
        )?;
        let response = self.request(Method::DELETE, url).await?.send().await?;
        accepted_operation(response).await
    }
}

async fn accepted_operation(response: reqwest::Response) -> Result<String, ApiError> {
    match response.status() {
        StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => {
            let body: OperationAccepted = response.json().await?;
            info!("Operation {} accepted", body.operation);
            Ok(body.operation)
        }
        _ => Err(error_from_response(response).await),
    }
}
