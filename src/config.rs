// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::binding::lifecycle::{AbsentDeletePolicy, BindingRules};
use crate::constants::{broker, timeouts};
use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// OAuth2 client credentials
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub token_url: Url,
    pub client_id: String,
    pub client_secret: String,
}

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct KebConfig {
    /// Base of the OSB API, ends with `v2/`
    pub api_url: Url,
    pub oauth: OAuthConfig,
    pub global_account_id: String,
    pub subaccount_id: String,
    pub user_id: String,
    pub plan_id: String,
    pub region: Option<String>,
}

/// Control-plane runtime API settings
#[derive(Debug, Clone)]
pub struct KcpConfig {
    pub api_url: Url,
    pub oauth: OAuthConfig,
}

/// Test run configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub instance_id: String,
    pub keb: KebConfig,
    /// Without it, scenarios that watch scheduled operations are skipped
    pub kcp: Option<KcpConfig>,
    /// Provision the instance under this name before running the scenarios
    pub provision_name: Option<String>,
    pub skip_deprovisioning: bool,
    pub poll_interval: Duration,
    pub rules: BindingRules,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let instance_id = required("INSTANCE_ID")?;
        let keb = KebConfig::from_env()?;
        let kcp = match env::var("KCP_KEB_API_URL") {
            Ok(url) if !url.is_empty() => Some(KcpConfig::from_env(&url)?),
            _ => None,
        };
        let provision_name = env::var("PROVISION_INSTANCE_NAME")
            .ok()
            .filter(|n| !n.is_empty());
        let skip_deprovisioning = env::var("SKIP_DEPROVISIONING")
            .unwrap_or("false".to_string())
            .parse()
            .unwrap_or(false);
        let poll_interval = optional_parsed::<u64>("POLL_INTERVAL_SECONDS")?
            .map(Duration::from_secs)
            .unwrap_or(timeouts::POLL_INTERVAL);

        Ok(Config {
            instance_id,
            keb,
            kcp,
            provision_name,
            skip_deprovisioning,
            poll_interval,
            rules: rules_from_env()?,
        })
    }
}

impl KebConfig {
    fn from_env() -> Result<Self> {
        let host = required("KEB_HOST")?;
        let platform_region = env::var("KEB_PLATFORM_REGION").unwrap_or_default();
        let token_url = env::var("KEB_TOKEN_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("https://oauth2.{host}/oauth2/token"));

        Ok(KebConfig {
            api_url: broker_api_url(&host, &platform_region)?,
            oauth: OAuthConfig {
                token_url: Url::parse(&token_url).context("KEB_TOKEN_URL is not a valid URL")?,
                client_id: required("KEB_CLIENT_ID")?,
                client_secret: required("KEB_CLIENT_SECRET")?,
            },
            global_account_id: env::var("KEB_GLOBALACCOUNT_ID").unwrap_or_default(),
            subaccount_id: env::var("KEB_SUBACCOUNT_ID").unwrap_or_default(),
            user_id: env::var("KEB_USER_ID").unwrap_or_default(),
            plan_id: env::var("KEB_PLAN_ID")
                .ok()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| broker::TRIAL_PLAN_ID.to_string()),
            region: env::var("KEB_REGION").ok().filter(|r| !r.is_empty()),
        })
    }
}

impl KcpConfig {
    fn from_env(api_url: &str) -> Result<Self> {
        let issuer = required("KCP_OAUTH2_ISSUER_URL")?;
        let token_url = format!("{}/oauth2/token", issuer.trim_end_matches('/'));
        Ok(KcpConfig {
            api_url: Url::parse(api_url).context("KCP_KEB_API_URL is not a valid URL")?,
            oauth: OAuthConfig {
                token_url: Url::parse(&token_url)
                    .context("KCP_OAUTH2_ISSUER_URL is not a valid URL")?,
                client_id: required("KCP_OAUTH2_CLIENT_ID")?,
                client_secret: required("KCP_OAUTH2_CLIENT_SECRET")?,
            },
        })
    }
}

/// Broker OSB API base, e.g. `https://kyma-env-broker.example.com/oauth/cf-eu10/v2/`
pub fn broker_api_url(host: &str, platform_region: &str) -> Result<Url> {
    let region = if platform_region.is_empty() {
        String::new()
    } else {
        format!("{}/", platform_region.trim_matches('/'))
    };
    Url::parse(&format!("https://kyma-env-broker.{host}/oauth/{region}v2/"))
        .with_context(|| format!("invalid broker host '{host}'"))
}

fn rules_from_env() -> Result<BindingRules> {
    let mut rules = BindingRules::default();
    if let Some(min) = optional_parsed("BINDING_MIN_EXPIRATION_SECONDS")? {
        rules.min_expiration_secs = min;
    }
    if let Some(max) = optional_parsed("BINDING_MAX_EXPIRATION_SECONDS")? {
        rules.max_expiration_secs = max;
    }
    if let Some(count) = optional_parsed("BINDING_MAX_COUNT")? {
        rules.max_live_bindings = count;
    }
    if let Ok(policy) = env::var("BINDING_DELETE_ABSENT_STATUS") {
        rules.absent_delete = parse_absent_delete_policy(&policy)?;
    }
    if rules.min_expiration_secs > rules.max_expiration_secs {
        bail!(
            "binding expiration range is empty: min {} > max {}",
            rules.min_expiration_secs,
            rules.max_expiration_secs
        );
    }
    Ok(rules)
}

fn parse_absent_delete_policy(value: &str) -> Result<AbsentDeletePolicy> {
    match value.trim().to_lowercase().as_str() {
        "404" => Ok(AbsentDeletePolicy::NotFound),
        "410" => Ok(AbsentDeletePolicy::Gone),
        "any" | "" => Ok(AbsentDeletePolicy::Either),
        other => bail!("BINDING_DELETE_ABSENT_STATUS must be 404, 410 or any, got '{other}'"),
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .with_context(|| format!("{key} environment variable not set"))
}

fn optional_parsed<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) if !value.is_empty() => value
            .parse()
            .map(Some)
            .with_context(|| format!("{key} has an invalid value '{value}'")),
        _ => Ok(None),
    }
}
