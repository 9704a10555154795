// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Binding scenarios. Every call result goes through a [BindingTracker] so a
//! response the lifecycle rules do not admit fails the scenario.

use crate::binding::{BindingAction, BindingState, BindingTracker, Outcome, RejectReason};
use crate::constants::binding as limits;
use crate::context::TestContext;
use crate::error::{ApiError, Result, ScenarioError};
use crate::instrument::with_elapsed_time;
use crate::kubeconfig;
use crate::quota::QuotaProbe;
use crate::types::{Binding, BindingParameters};
use std::fmt;
use tracing::{info, instrument, warn};

/// Binding scenarios in the order the suite runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingScenario {
    CreateGetDelete,
    ExpirationBelowMinimum,
    ExpirationAboveMaximum,
    IdempotentCreate,
    ConflictingCreate,
    GetAbsent,
    DeleteAbsent,
    DeleteTwice,
    KubeconfigOutlivesDelete,
    QuotaAboveLimit,
}

impl BindingScenario {
    pub const ALL: [BindingScenario; 10] = [
        BindingScenario::CreateGetDelete,
        BindingScenario::ExpirationBelowMinimum,
        BindingScenario::ExpirationAboveMaximum,
        BindingScenario::IdempotentCreate,
        BindingScenario::ConflictingCreate,
        BindingScenario::GetAbsent,
        BindingScenario::DeleteAbsent,
        BindingScenario::DeleteTwice,
        BindingScenario::KubeconfigOutlivesDelete,
        BindingScenario::QuotaAboveLimit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BindingScenario::CreateGetDelete => "create-get-delete",
            BindingScenario::ExpirationBelowMinimum => "expiration-below-minimum",
            BindingScenario::ExpirationAboveMaximum => "expiration-above-maximum",
            BindingScenario::IdempotentCreate => "idempotent-create",
            BindingScenario::ConflictingCreate => "conflicting-create",
            BindingScenario::GetAbsent => "get-absent",
            BindingScenario::DeleteAbsent => "delete-absent",
            BindingScenario::DeleteTwice => "delete-twice",
            BindingScenario::KubeconfigOutlivesDelete => "kubeconfig-outlives-delete",
            BindingScenario::QuotaAboveLimit => "quota-above-limit",
        }
    }

    /// Run the scenario; bindings it created are deleted afterwards whether
    /// it passed or not.
    pub async fn run(self, ctx: &TestContext) -> Result<()> {
        let mut session = Session::new(ctx);
        let result = match self {
            BindingScenario::CreateGetDelete => create_get_delete(&mut session).await,
            BindingScenario::ExpirationBelowMinimum => expiration_below_minimum(&mut session).await,
            BindingScenario::ExpirationAboveMaximum => expiration_above_maximum(&mut session).await,
            BindingScenario::IdempotentCreate => idempotent_create(&mut session).await,
            BindingScenario::ConflictingCreate => conflicting_create(&mut session).await,
            BindingScenario::GetAbsent => get_absent(&mut session).await,
            BindingScenario::DeleteAbsent => delete_absent(&mut session).await,
            BindingScenario::DeleteTwice => delete_twice(&mut session).await,
            BindingScenario::KubeconfigOutlivesDelete => {
                kubeconfig_outlives_delete(&mut session).await
            }
            BindingScenario::QuotaAboveLimit => quota_above_limit(&mut session).await,
        };
        session.cleanup().await;
        result
    }
}

impl fmt::Display for BindingScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Run every binding scenario, stopping at the first failure.
pub async fn run_binding_suite(ctx: &TestContext) -> Result<()> {
    for scenario in BindingScenario::ALL {
        info!("Running binding scenario '{}'", scenario);
        with_elapsed_time(scenario.name(), scenario.run(ctx)).await?;
    }
    Ok(())
}

/// Binding calls of one scenario, checked against the lifecycle rules.
struct Session<'a> {
    ctx: &'a TestContext,
    tracker: BindingTracker,
    /// Ids the broker accepted a create for
    created: Vec<String>,
}

impl<'a> Session<'a> {
    fn new(ctx: &'a TestContext) -> Self {
        Self {
            ctx,
            tracker: ctx.tracker(),
            created: Vec::new(),
        }
    }

    async fn create(
        &mut self,
        binding_id: &str,
        parameters: &BindingParameters,
        expected: Outcome,
    ) -> Result<Option<Binding>> {
        let result = self
            .ctx
            .bindings
            .create_binding(&self.ctx.instance_id, binding_id, parameters)
            .await;
        self.remember(binding_id, &result);
        let outcome = self.tracker.record_create(binding_id, parameters, &result)?;
        require(binding_id, outcome, expected)?;
        Ok(result.ok().map(|o| o.into_binding()))
    }

    /// Keep an accepted create for cleanup, even when the rules did not admit it.
    fn remember<T>(&mut self, binding_id: &str, result: &std::result::Result<T, ApiError>) {
        if result.is_ok() && !self.created.iter().any(|id| id == binding_id) {
            self.created.push(binding_id.to_string());
        }
    }

    async fn get(&mut self, binding_id: &str, expected: Outcome) -> Result<Option<Binding>> {
        let result = self
            .ctx
            .bindings
            .get_binding(&self.ctx.instance_id, binding_id)
            .await;
        let outcome = self.tracker.record_get(binding_id, &result)?;
        require(binding_id, outcome, expected)?;
        Ok(result.ok())
    }

    /// Delete and return the observed outcome, whatever the rules admitted.
    async fn delete(&mut self, binding_id: &str) -> Result<Outcome> {
        let result = self
            .ctx
            .bindings
            .delete_binding(&self.ctx.instance_id, binding_id)
            .await;
        self.tracker.record_delete(binding_id, &result)
    }

    /// Delete every created binding not yet deleted; failures are only logged.
    async fn cleanup(&mut self) {
        let created = std::mem::take(&mut self.created);
        let leftover: Vec<String> = created
            .into_iter()
            .filter(|id| self.tracker.state(id) != BindingState::Deleted)
            .collect();
        delete_all(self.ctx, &leftover).await;
    }

    fn next_id(&self) -> String {
        self.ctx.ids.next_id()
    }
}

/// Delete bindings without checking the answers, for cleanup.
async fn delete_all(ctx: &TestContext, binding_ids: &[String]) {
    for binding_id in binding_ids {
        if let Err(e) = ctx
            .bindings
            .delete_binding(&ctx.instance_id, binding_id)
            .await
        {
            warn!("Failed to clean up binding {}: {}", binding_id, e);
        }
    }
}

fn require(binding_id: &str, observed: Outcome, expected: Outcome) -> Result<()> {
    if observed != expected {
        return Err(ScenarioError::Assertion(format!(
            "binding {binding_id}: expected {expected}, got {observed}"
        )));
    }
    Ok(())
}

fn present(binding_id: &str, binding: Option<Binding>) -> Result<Binding> {
    binding.ok_or_else(|| {
        ScenarioError::Assertion(format!("binding {binding_id}: no binding in response"))
    })
}

/// The token in the kubeconfig must be valid for about as long as requested.
fn check_validity(binding: &Binding, expiration_secs: u64) -> Result<()> {
    let validity = kubeconfig::validity(&binding.credentials.kubeconfig)?.as_secs();
    if validity.abs_diff(expiration_secs) > limits::VALIDITY_TOLERANCE_SECS {
        return Err(ScenarioError::Assertion(format!(
            "binding {}: kubeconfig valid for {}s, requested {}s",
            binding.id, validity, expiration_secs
        )));
    }
    info!("Kubeconfig of binding {} is valid for {}s", binding.id, validity);
    Ok(())
}

#[instrument(skip(session))]
async fn create_get_delete(session: &mut Session<'_>) -> Result<()> {
    let ctx = session.ctx;
    let id = session.next_id();
    let parameters = BindingParameters::with_expiration(900);

    let created = session.create(&id, &parameters, Outcome::Created).await?;
    let created = present(&id, created)?;
    check_validity(&created, 900)?;
    ctx.access.check(&created.credentials.kubeconfig).await?;

    let fetched = present(&id, session.get(&id, Outcome::Fetched).await?)?;
    if fetched.credentials != created.credentials {
        return Err(ScenarioError::Assertion(format!(
            "binding {id}: credentials from get differ from create"
        )));
    }
    ctx.access.check(&fetched.credentials.kubeconfig).await?;

    require(&id, session.delete(&id).await?, Outcome::Deleted)?;
    session.get(&id, Outcome::NotFound).await?;
    Ok(())
}

/// Every expiration must be turned down with `reason` and leave no binding.
async fn reject_expirations(
    session: &mut Session<'_>,
    expirations: &[u64],
    reason: RejectReason,
) -> Result<()> {
    for &expiration in expirations {
        let id = session.next_id();
        info!("Requesting binding {} with expiration {}s", id, expiration);
        session
            .create(
                &id,
                &BindingParameters::with_expiration(expiration),
                Outcome::Rejected(reason),
            )
            .await?;
        session.get(&id, Outcome::NotFound).await?;
    }
    Ok(())
}

#[instrument(skip(session))]
async fn expiration_below_minimum(session: &mut Session<'_>) -> Result<()> {
    let Some(edge) = session.ctx.rules.min_expiration_secs.checked_sub(1) else {
        info!("Minimum expiration is 0s, no expiration falls below it");
        return Ok(());
    };
    let mut expirations = vec![edge];
    if limits::FAR_BELOW_MIN_EXPIRATION_SECS < edge {
        expirations.push(limits::FAR_BELOW_MIN_EXPIRATION_SECS);
    }
    reject_expirations(session, &expirations, RejectReason::ExpirationBelowMinimum).await
}

#[instrument(skip(session))]
async fn expiration_above_maximum(session: &mut Session<'_>) -> Result<()> {
    let Some(edge) = session.ctx.rules.max_expiration_secs.checked_add(1) else {
        info!("Maximum expiration is unbounded, no expiration exceeds it");
        return Ok(());
    };
    let mut expirations = vec![edge];
    if limits::FAR_ABOVE_MAX_EXPIRATION_SECS > edge {
        expirations.push(limits::FAR_ABOVE_MAX_EXPIRATION_SECS);
    }
    reject_expirations(session, &expirations, RejectReason::ExpirationAboveMaximum).await
}

#[instrument(skip(session))]
async fn idempotent_create(session: &mut Session<'_>) -> Result<()> {
    let id = session.next_id();
    let parameters =
        BindingParameters::with_expiration(session.ctx.rules.default_expiration_secs);

    let first = present(&id, session.create(&id, &parameters, Outcome::Created).await?)?;
    let second = present(&id, session.create(&id, &parameters, Outcome::Replayed).await?)?;
    if first.credentials != second.credentials {
        return Err(ScenarioError::Assertion(format!(
            "binding {id}: replayed create returned different credentials"
        )));
    }
    Ok(())
}

#[instrument(skip(session))]
async fn conflicting_create(session: &mut Session<'_>) -> Result<()> {
    let id = session.next_id();

    session
        .create(&id, &BindingParameters::with_expiration(800), Outcome::Created)
        .await?;
    session
        .create(
            &id,
            &BindingParameters::with_expiration(801),
            Outcome::Rejected(RejectReason::Conflict),
        )
        .await?;
    Ok(())
}

#[instrument(skip(session))]
async fn get_absent(session: &mut Session<'_>) -> Result<()> {
    let id = session.next_id();
    session.get(&id, Outcome::NotFound).await?;
    Ok(())
}

#[instrument(skip(session))]
async fn delete_absent(session: &mut Session<'_>) -> Result<()> {
    let id = session.next_id();
    let outcome = session.delete(&id).await?;
    info!("Deleting a binding that never existed returned {}", outcome);
    Ok(())
}

#[instrument(skip(session))]
async fn delete_twice(session: &mut Session<'_>) -> Result<()> {
    let id = session.next_id();
    let parameters = BindingParameters::default();

    session.create(&id, &parameters, Outcome::Created).await?;
    require(&id, session.delete(&id).await?, Outcome::Deleted)?;
    require(&id, session.delete(&id).await?, Outcome::Gone)?;
    Ok(())
}

/// Deleting a binding does not revoke its kubeconfig; the token stays valid
/// until it expires.
#[instrument(skip(session))]
async fn kubeconfig_outlives_delete(session: &mut Session<'_>) -> Result<()> {
    let ctx = session.ctx;
    let id = session.next_id();

    let created = present(
        &id,
        session
            .create(&id, &BindingParameters::default(), Outcome::Created)
            .await?,
    )?;
    ctx.access.check(&created.credentials.kubeconfig).await?;

    require(&id, session.delete(&id).await?, Outcome::Deleted)?;
    ctx.access.check(&created.credentials.kubeconfig).await?;
    Ok(())
}

/// Create bindings until the live-binding quota rejects one, then check no
/// further create gets through. Bindings the probe created are deleted on
/// every path.
#[instrument(skip(session))]
async fn quota_above_limit(session: &mut Session<'_>) -> Result<()> {
    let ctx = session.ctx;
    let parameters = BindingParameters::default();
    let params = &parameters;

    let probe = QuotaProbe::new(ctx.ids.as_ref())
        .probe_until_rejected(
            move |binding_id| async move {
                ctx.bindings
                    .create_binding(&ctx.instance_id, &binding_id, params)
                    .await
            },
            ctx.rules.quota_probe_attempts(),
        )
        .await;
    let outcome = match probe {
        Ok(outcome) => outcome,
        Err(e) => {
            delete_all(ctx, e.created_ids()).await;
            return Err(e.into());
        }
    };
    info!(
        "Quota rejection after {} attempts ({} created): {}",
        outcome.attempts_made,
        outcome.created_ids.len(),
        outcome.rejection
    );

    // the instance is at its limit now, whoever holds the other bindings
    let probe_id = session.next_id();
    let expectation = ctx.rules.expect(
        &BindingState::Absent,
        BindingAction::Create(&parameters),
        Some(ctx.rules.max_live_bindings),
    );
    let result = ctx
        .bindings
        .create_binding(&ctx.instance_id, &probe_id, &parameters)
        .await;
    session.remember(&probe_id, &result);
    let observed = session.tracker.record_create(&probe_id, &parameters, &result);
    delete_all(ctx, &outcome.created_ids).await;

    let observed = observed?;
    if !expectation.admits(observed) {
        return Err(ScenarioError::Assertion(format!(
            "binding {probe_id}: created past the quota, expected {expectation}, got {observed}"
        )));
    }
    Ok(())
}
