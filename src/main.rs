// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use skr_e2e::config::Config;
use skr_e2e::constants::timeouts;
use skr_e2e::context::TestContext;
use skr_e2e::instrument::with_elapsed_time;
use skr_e2e::scenarios;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting SKR lifecycle e2e run");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: instance_id={}, broker={}",
        config.instance_id, config.keb.api_url
    );

    let ctx = TestContext::from_config(&config)?;

    if let Some(name) = &config.provision_name {
        with_elapsed_time("provisioning", scenarios::provision(&ctx, name)).await?;
    }

    let suite = with_elapsed_time("binding-suite", scenarios::run_binding_suite(&ctx)).await;

    let mut suspended = false;
    let suspension = if suite.is_ok() && ctx.runtimes.is_some() {
        let result =
            with_elapsed_time("trial-suspension", scenarios::trial_suspension(&ctx)).await;
        suspended = result.is_ok();
        result.map(|_| ())
    } else {
        if ctx.runtimes.is_none() {
            info!("Control-plane runtime API not configured, skipping trial suspension");
        }
        Ok(())
    };

    if config.skip_deprovisioning {
        warn!("Skipping deprovisioning of instance {}", ctx.instance_id);
    } else {
        let timeout = if suspended {
            timeouts::DEPROVISIONING_AFTER_SUSPENSION
        } else {
            timeouts::DEPROVISIONING
        };
        if let Err(e) =
            with_elapsed_time("deprovisioning", scenarios::deprovision(&ctx, timeout)).await
        {
            error!("Deprovisioning failed: {}", e);
            return Err(e.into());
        }
    }

    suite?;
    suspension?;
    info!("All scenarios passed");
    Ok(())
}
