// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Inspection of kubeconfigs handed out by bindings

use crate::constants::access_check;
use crate::error::{Result, ScenarioError};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument};

#[derive(Deserialize, Debug)]
struct RawKubeconfig {
    #[serde(rename = "current-context", default)]
    current_context: Option<String>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Deserialize, Debug)]
struct NamedContext {
    name: String,
    context: ContextRef,
}

#[derive(Deserialize, Debug)]
struct ContextRef {
    user: String,
}

#[derive(Deserialize, Debug)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: UserCredentials,
}

#[derive(Deserialize, Debug, Default)]
struct UserCredentials {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Deserialize, Debug)]
struct TokenClaims {
    iat: i64,
    exp: i64,
}

/// Bearer token of the user the current context points at, or of the first
/// user when there is no current context.
pub fn bearer_token(kubeconfig: &str) -> Result<String> {
    let raw: RawKubeconfig = serde_yaml::from_str(kubeconfig)
        .map_err(|e| ScenarioError::Kubeconfig(format!("Failed to parse kubeconfig: {}", e)))?;

    let user_name = raw.current_context.as_ref().and_then(|current| {
        raw.contexts
            .iter()
            .find(|c| &c.name == current)
            .map(|c| c.context.user.clone())
    });
    let user = match user_name {
        Some(name) => raw.users.iter().find(|u| u.name == name),
        None => raw.users.first(),
    };

    user.and_then(|u| u.user.token.clone())
        .ok_or_else(|| ScenarioError::Kubeconfig("Kubeconfig has no user token".to_string()))
}

/// How long the kubeconfig's token is valid, from its `iat` and `exp` claims.
pub fn validity(kubeconfig: &str) -> Result<Duration> {
    let token = bearer_token(kubeconfig)?;
    let claims = token_claims(&token)?;
    let seconds = claims.exp - claims.iat;
    if seconds < 0 {
        return Err(ScenarioError::Kubeconfig(format!(
            "Token expires before it was issued (iat {}, exp {})",
            claims.iat, claims.exp
        )));
    }
    debug!("Kubeconfig token is valid for {}s", seconds);
    Ok(Duration::from_secs(seconds as u64))
}

fn token_claims(token: &str) -> Result<TokenClaims> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| ScenarioError::Kubeconfig("Token is not a JWT".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ScenarioError::Kubeconfig(format!("Failed to decode token payload: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ScenarioError::Kubeconfig(format!("Failed to parse token claims: {}", e)))
}

/// Create a Kubernetes client from a kubeconfig string
pub async fn client_from_kubeconfig(kubeconfig: &str) -> Result<Client> {
    let parsed: Kubeconfig = serde_yaml::from_str(kubeconfig)
        .map_err(|e| ScenarioError::Kubeconfig(format!("Failed to parse kubeconfig: {}", e)))?;

    let config = kube::Config::from_custom_kubeconfig(parsed, &KubeConfigOptions::default())
        .await
        .map_err(|e| ScenarioError::Kubeconfig(format!("Failed to create config: {}", e)))?;

    Client::try_from(config)
        .map_err(|e| ScenarioError::Kubeconfig(format!("Failed to create client: {}", e)))
}

/// Prove the credentials work by reading a secret every managed cluster has.
#[instrument(skip(client))]
pub async fn check_access(client: &Client) -> Result<Secret> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), access_check::NAMESPACE);
    info!(
        "Getting secret '{}/{}' with binding credentials...",
        access_check::NAMESPACE,
        access_check::SECRET_NAME
    );
    let secret = secrets.get(access_check::SECRET_NAME).await?;
    debug!(
        "Secret has {} data keys",
        secret.data.as_ref().map(|d| d.len()).unwrap_or(0)
    );
    Ok(secret)
}

/// Verifies that a kubeconfig grants access to its cluster.
#[async_trait]
pub trait AccessCheck: Send + Sync {
    async fn check(&self, kubeconfig: &str) -> Result<()>;
}

/// Connects to the cluster the kubeconfig points at.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterAccess;

#[async_trait]
impl AccessCheck for ClusterAccess {
    async fn check(&self, kubeconfig: &str) -> Result<()> {
        let client = client_from_kubeconfig(kubeconfig).await?;
        check_access(&client).await?;
        Ok(())
    }
}
