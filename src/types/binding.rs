// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parameters sent when creating a binding.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account: Option<bool>,
}

impl BindingParameters {
    pub fn with_expiration(expiration_seconds: u64) -> Self {
        Self {
            expiration_seconds: Some(expiration_seconds),
            service_account: None,
        }
    }

    /// Expiration the server applies, falling back to its default when omitted
    pub fn effective_expiration(&self, default_seconds: u64) -> u64 {
        self.expiration_seconds.unwrap_or(default_seconds)
    }

    /// Canonical representation used to decide whether two creates carry the
    /// same parameters. Omitted values are replaced by what the server applies.
    pub fn fingerprint(&self, default_expiration_secs: u64) -> String {
        format!(
            "expiration_seconds={};service_account={}",
            self.effective_expiration(default_expiration_secs),
            self.service_account.unwrap_or(false)
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub kubeconfig: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingMetadata {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A binding as returned by the broker.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    #[serde(skip)]
    pub id: String,
    #[serde(skip)]
    pub instance_id: String,
    pub credentials: Credentials,
    #[serde(default)]
    pub metadata: BindingMetadata,
}

/// Successful result of a create call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    /// 201, a new binding was created
    Created(Binding),
    /// 200, the same binding was already there
    Existing(Binding),
}

impl CreateOutcome {
    pub fn into_binding(self) -> Binding {
        match self {
            CreateOutcome::Created(b) | CreateOutcome::Existing(b) => b,
        }
    }
}
