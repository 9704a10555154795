// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Expected broker behaviour for a binding id, as a small state machine.
//!
//! Scenarios feed every create/get/delete result through a [BindingTracker],
//! which checks the observed answer against [BindingRules::expect] and moves
//! the tracked state forward. The number of live bindings on an instance is
//! owned by the control plane and shared with other scenarios, so it is never
//! derived from local bookkeeping: callers pass it in when they know it, and
//! an unknown count admits both a created binding and a quota rejection.

use crate::constants::{binding, rejection};
use crate::error::{ApiError, Result, ScenarioError};
use crate::types::{Binding, BindingParameters, CreateOutcome};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Status expected when deleting a binding id that never existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentDeletePolicy {
    NotFound,
    Gone,
    /// Broker versions differ, accept both
    Either,
}

/// Limits the broker enforces on bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRules {
    pub min_expiration_secs: u64,
    pub max_expiration_secs: u64,
    pub default_expiration_secs: u64,
    pub max_live_bindings: usize,
    pub absent_delete: AbsentDeletePolicy,
}

impl Default for BindingRules {
    fn default() -> Self {
        Self {
            min_expiration_secs: binding::MIN_EXPIRATION_SECS,
            max_expiration_secs: binding::MAX_EXPIRATION_SECS,
            default_expiration_secs: binding::DEFAULT_EXPIRATION_SECS,
            max_live_bindings: binding::MAX_LIVE_BINDINGS,
            absent_delete: AbsentDeletePolicy::Either,
        }
    }
}

/// Why the broker turned a create down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ExpirationBelowMinimum,
    ExpirationAboveMaximum,
    QuotaExceeded,
    Conflict,
    /// Any other 4xx
    Other(u16),
}

impl RejectReason {
    /// Classify a 4xx answer from its status and description.
    pub fn from_rejection(status: u16, description: &str) -> Self {
        match status {
            409 => RejectReason::Conflict,
            400 if description.contains(rejection::EXPIRATION_BELOW_MIN) => {
                RejectReason::ExpirationBelowMinimum
            }
            400 if description.contains(rejection::EXPIRATION_ABOVE_MAX) => {
                RejectReason::ExpirationAboveMaximum
            }
            400 if description.contains(rejection::QUOTA_EXCEEDED) => RejectReason::QuotaExceeded,
            other => RejectReason::Other(other),
        }
    }

    pub fn status(self) -> u16 {
        match self {
            RejectReason::Conflict => 409,
            RejectReason::Other(status) => status,
            _ => 400,
        }
    }
}

/// Observed answer to a binding call, mapped onto the lifecycle table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 201 on create
    Created,
    /// 200 on create, idempotent replay
    Replayed,
    /// 200 on get
    Fetched,
    /// 200 on delete
    Deleted,
    Rejected(RejectReason),
    NotFound,
    Gone,
}

impl Outcome {
    pub fn status(self) -> u16 {
        match self {
            Outcome::Created => 201,
            Outcome::Replayed | Outcome::Fetched | Outcome::Deleted => 200,
            Outcome::Rejected(reason) => reason.status(),
            Outcome::NotFound => 404,
            Outcome::Gone => 410,
        }
    }

    pub fn of_create(result: &std::result::Result<CreateOutcome, ApiError>) -> Result<Self> {
        match result {
            Ok(CreateOutcome::Created(_)) => Ok(Outcome::Created),
            Ok(CreateOutcome::Existing(_)) => Ok(Outcome::Replayed),
            Err(err) => Self::of_error(err),
        }
    }

    pub fn of_get(result: &std::result::Result<Binding, ApiError>) -> Result<Self> {
        match result {
            Ok(_) => Ok(Outcome::Fetched),
            Err(err) => Self::of_error(err),
        }
    }

    pub fn of_delete(result: &std::result::Result<(), ApiError>) -> Result<Self> {
        match result {
            Ok(()) => Ok(Outcome::Deleted),
            Err(err) => Self::of_error(err),
        }
    }

    /// Only answers the lifecycle table knows about are outcomes; anything
    /// else is propagated as an unexpected error.
    fn of_error(err: &ApiError) -> Result<Self> {
        match err {
            ApiError::NotFound { .. } => Ok(Outcome::NotFound),
            ApiError::Gone { .. } => Ok(Outcome::Gone),
            ApiError::Rejected {
                status,
                description,
            } => Ok(Outcome::Rejected(RejectReason::from_rejection(
                *status,
                description,
            ))),
            other => Err(ScenarioError::Api(other.clone())),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Rejected(reason) => write!(f, "{} ({:?})", self.status(), reason),
            other => write!(f, "{} ({:?})", other.status(), other),
        }
    }
}

/// Set of outcomes the lifecycle table admits for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    admitted: Vec<Outcome>,
}

impl Expectation {
    pub fn exactly(outcome: Outcome) -> Self {
        Self {
            admitted: vec![outcome],
        }
    }

    pub fn any_of(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            admitted: outcomes.into_iter().collect(),
        }
    }

    pub fn admits(&self, outcome: Outcome) -> bool {
        self.admitted.contains(&outcome)
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.admitted.iter().map(|o| o.to_string()).collect();
        f.write_str(&parts.join(" or "))
    }
}

/// State of one binding id as seen by a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingState {
    Absent,
    Live {
        parameters: BindingParameters,
        created_at: Instant,
    },
    /// Past its expiration; the broker may not have processed it yet
    Expired { parameters: BindingParameters },
    Deleted,
}

/// Call issued against a binding id.
#[derive(Debug, Clone, Copy)]
pub enum BindingAction<'a> {
    Create(&'a BindingParameters),
    Get,
    Delete,
}

impl BindingRules {
    /// Attempts a quota probe may make before the quota counts as not enforced
    pub fn quota_probe_attempts(&self) -> usize {
        self.max_live_bindings + binding::QUOTA_PROBE_SLACK
    }

    /// Range violation of the requested expiration, if any.
    pub fn check_expiration(&self, parameters: &BindingParameters) -> Option<RejectReason> {
        let expiration = parameters.effective_expiration(self.default_expiration_secs);
        if expiration < self.min_expiration_secs {
            Some(RejectReason::ExpirationBelowMinimum)
        } else if expiration > self.max_expiration_secs {
            Some(RejectReason::ExpirationAboveMaximum)
        } else {
            None
        }
    }

    /// Resolve expiry: a live binding past its expiration reads as expired.
    pub fn effective_state(&self, state: &BindingState, now: Instant) -> BindingState {
        match state {
            BindingState::Live {
                parameters,
                created_at,
            } => {
                let ttl = Duration::from_secs(
                    parameters.effective_expiration(self.default_expiration_secs),
                );
                if now > *created_at + ttl {
                    BindingState::Expired {
                        parameters: parameters.clone(),
                    }
                } else {
                    state.clone()
                }
            }
            other => other.clone(),
        }
    }

    /// Outcomes admitted for `action` on a binding in `state`.
    ///
    /// `live_bindings` is the number of live bindings on the instance when
    /// the caller knows it.
    pub fn expect(
        &self,
        state: &BindingState,
        action: BindingAction<'_>,
        live_bindings: Option<usize>,
    ) -> Expectation {
        match action {
            BindingAction::Create(parameters) => {
                if let Some(reason) = self.check_expiration(parameters) {
                    return Expectation::exactly(Outcome::Rejected(reason));
                }
                match state {
                    BindingState::Absent | BindingState::Deleted => {
                        self.expect_new_binding(live_bindings)
                    }
                    BindingState::Live {
                        parameters: existing,
                        ..
                    } => {
                        if self.same_parameters(existing, parameters) {
                            Expectation::exactly(Outcome::Replayed)
                        } else {
                            Expectation::exactly(Outcome::Rejected(RejectReason::Conflict))
                        }
                    }
                    // the broker may or may not have cleaned it up yet
                    BindingState::Expired { .. } => Expectation::any_of([
                        Outcome::Created,
                        Outcome::Replayed,
                        Outcome::Rejected(RejectReason::Conflict),
                        Outcome::Rejected(RejectReason::QuotaExceeded),
                    ]),
                }
            }
            BindingAction::Get => match state {
                BindingState::Live { .. } => Expectation::exactly(Outcome::Fetched),
                _ => Expectation::exactly(Outcome::NotFound),
            },
            BindingAction::Delete => match state {
                BindingState::Live { .. } => Expectation::exactly(Outcome::Deleted),
                BindingState::Deleted => Expectation::exactly(Outcome::Gone),
                BindingState::Absent => match self.absent_delete {
                    AbsentDeletePolicy::NotFound => Expectation::exactly(Outcome::NotFound),
                    AbsentDeletePolicy::Gone => Expectation::exactly(Outcome::Gone),
                    AbsentDeletePolicy::Either => {
                        Expectation::any_of([Outcome::NotFound, Outcome::Gone])
                    }
                },
                BindingState::Expired { .. } => {
                    Expectation::any_of([Outcome::Deleted, Outcome::NotFound, Outcome::Gone])
                }
            },
        }
    }

    fn expect_new_binding(&self, live_bindings: Option<usize>) -> Expectation {
        match live_bindings {
            Some(count) if count >= self.max_live_bindings => {
                Expectation::exactly(Outcome::Rejected(RejectReason::QuotaExceeded))
            }
            Some(_) => Expectation::exactly(Outcome::Created),
            None => Expectation::any_of([
                Outcome::Created,
                Outcome::Rejected(RejectReason::QuotaExceeded),
            ]),
        }
    }

    fn same_parameters(&self, a: &BindingParameters, b: &BindingParameters) -> bool {
        a.fingerprint(self.default_expiration_secs) == b.fingerprint(self.default_expiration_secs)
    }
}

/// Checks observed binding calls against [BindingRules] and tracks the state
/// of every binding id a scenario touched.
#[derive(Debug, Clone)]
pub struct BindingTracker {
    rules: BindingRules,
    bindings: HashMap<String, BindingState>,
}

impl BindingTracker {
    pub fn new(rules: BindingRules) -> Self {
        Self {
            rules,
            bindings: HashMap::new(),
        }
    }

    /// Current state of a binding id, with expiry applied.
    pub fn state(&self, binding_id: &str) -> BindingState {
        self.bindings
            .get(binding_id)
            .map(|s| self.rules.effective_state(s, Instant::now()))
            .unwrap_or(BindingState::Absent)
    }

    pub fn record_create(
        &mut self,
        binding_id: &str,
        parameters: &BindingParameters,
        result: &std::result::Result<CreateOutcome, ApiError>,
    ) -> Result<Outcome> {
        let outcome = Outcome::of_create(result)?;
        self.check(binding_id, BindingAction::Create(parameters), outcome)
    }

    pub fn record_get(
        &mut self,
        binding_id: &str,
        result: &std::result::Result<Binding, ApiError>,
    ) -> Result<Outcome> {
        let outcome = Outcome::of_get(result)?;
        self.check(binding_id, BindingAction::Get, outcome)
    }

    pub fn record_delete(
        &mut self,
        binding_id: &str,
        result: &std::result::Result<(), ApiError>,
    ) -> Result<Outcome> {
        let outcome = Outcome::of_delete(result)?;
        self.check(binding_id, BindingAction::Delete, outcome)
    }

    fn check(
        &mut self,
        binding_id: &str,
        action: BindingAction<'_>,
        outcome: Outcome,
    ) -> Result<Outcome> {
        let state = self.state(binding_id);
        let expectation = self.rules.expect(&state, action, None);
        if !expectation.admits(outcome) {
            return Err(ScenarioError::Assertion(format!(
                "binding {binding_id}: {action:?} in state {} returned {outcome}, expected {expectation}",
                state_name(&state)
            )));
        }

        debug!(binding_id, %outcome, "binding call matched expectation");
        match (action, outcome) {
            (BindingAction::Create(parameters), Outcome::Created) => {
                self.bindings.insert(
                    binding_id.to_string(),
                    BindingState::Live {
                        parameters: parameters.clone(),
                        created_at: Instant::now(),
                    },
                );
            }
            (BindingAction::Delete, Outcome::Deleted) => {
                self.bindings
                    .insert(binding_id.to_string(), BindingState::Deleted);
            }
            // the broker already dropped the expired binding
            (BindingAction::Delete, Outcome::NotFound | Outcome::Gone)
                if matches!(state, BindingState::Expired { .. }) =>
            {
                self.bindings
                    .insert(binding_id.to_string(), BindingState::Deleted);
            }
            _ => {}
        }
        Ok(outcome)
    }
}

fn state_name(state: &BindingState) -> &'static str {
    match state {
        BindingState::Absent => "absent",
        BindingState::Live { .. } => "live",
        BindingState::Expired { .. } => "expired",
        BindingState::Deleted => "deleted",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Credentials;

    fn make_binding(id: &str) -> Binding {
        Binding {
            id: id.to_string(),
            instance_id: "instance-1".to_string(),
            credentials: Credentials {
                kubeconfig: "kubeconfig".to_string(),
            },
            metadata: Default::default(),
        }
    }

    fn live(expiration: u64) -> BindingState {
        BindingState::Live {
            parameters: BindingParameters::with_expiration(expiration),
            created_at: Instant::now(),
        }
    }

    fn rejected(status: u16, description: &str) -> ApiError {
        ApiError::Rejected {
            status,
            description: description.to_string(),
        }
    }

    #[test]
    fn test_expiration_out_of_range_rejected_in_any_state() {
        let rules = BindingRules::default();
        let too_short = BindingParameters::with_expiration(1);
        let too_long = BindingParameters::with_expiration(1_000_000_000);

        for state in [BindingState::Absent, live(900), BindingState::Deleted] {
            assert_eq!(
                rules.expect(&state, BindingAction::Create(&too_short), Some(0)),
                Expectation::exactly(Outcome::Rejected(RejectReason::ExpirationBelowMinimum))
            );
            assert_eq!(
                rules.expect(&state, BindingAction::Create(&too_long), Some(0)),
                Expectation::exactly(Outcome::Rejected(RejectReason::ExpirationAboveMaximum))
            );
        }
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let rules = BindingRules::default();
        assert_eq!(
            rules.check_expiration(&BindingParameters::with_expiration(600)),
            None
        );
        assert_eq!(
            rules.check_expiration(&BindingParameters::with_expiration(7200)),
            None
        );
        assert_eq!(
            rules.check_expiration(&BindingParameters::with_expiration(599)),
            Some(RejectReason::ExpirationBelowMinimum)
        );
        assert_eq!(
            rules.check_expiration(&BindingParameters::with_expiration(7201)),
            Some(RejectReason::ExpirationAboveMaximum)
        );
    }

    #[test]
    fn test_create_on_live_binding() {
        let rules = BindingRules::default();
        let state = live(800);

        assert_eq!(
            rules.expect(
                &state,
                BindingAction::Create(&BindingParameters::with_expiration(800)),
                None
            ),
            Expectation::exactly(Outcome::Replayed)
        );
        assert_eq!(
            rules.expect(
                &state,
                BindingAction::Create(&BindingParameters::with_expiration(801)),
                None
            ),
            Expectation::exactly(Outcome::Rejected(RejectReason::Conflict))
        );
    }

    #[test]
    fn test_create_respects_known_live_count() {
        let rules = BindingRules::default();
        let params = BindingParameters::with_expiration(900);

        assert_eq!(
            rules.expect(&BindingState::Absent, BindingAction::Create(&params), Some(9)),
            Expectation::exactly(Outcome::Created)
        );
        assert_eq!(
            rules.expect(&BindingState::Absent, BindingAction::Create(&params), Some(10)),
            Expectation::exactly(Outcome::Rejected(RejectReason::QuotaExceeded))
        );

        let unknown = rules.expect(&BindingState::Absent, BindingAction::Create(&params), None);
        assert!(unknown.admits(Outcome::Created));
        assert!(unknown.admits(Outcome::Rejected(RejectReason::QuotaExceeded)));
    }

    #[test]
    fn test_get_and_delete_table() {
        let rules = BindingRules::default();

        assert!(rules
            .expect(&live(900), BindingAction::Get, None)
            .admits(Outcome::Fetched));
        assert!(rules
            .expect(&BindingState::Deleted, BindingAction::Get, None)
            .admits(Outcome::NotFound));
        assert!(rules
            .expect(&live(900), BindingAction::Delete, None)
            .admits(Outcome::Deleted));
        assert_eq!(
            rules.expect(&BindingState::Deleted, BindingAction::Delete, None),
            Expectation::exactly(Outcome::Gone)
        );
    }

    #[test]
    fn test_absent_delete_policy() {
        let mut rules = BindingRules::default();
        let either = rules.expect(&BindingState::Absent, BindingAction::Delete, None);
        assert!(either.admits(Outcome::NotFound) && either.admits(Outcome::Gone));

        rules.absent_delete = AbsentDeletePolicy::NotFound;
        assert_eq!(
            rules.expect(&BindingState::Absent, BindingAction::Delete, None),
            Expectation::exactly(Outcome::NotFound)
        );

        rules.absent_delete = AbsentDeletePolicy::Gone;
        assert_eq!(
            rules.expect(&BindingState::Absent, BindingAction::Delete, None),
            Expectation::exactly(Outcome::Gone)
        );
    }

    #[test]
    fn test_rejection_classification() {
        assert_eq!(
            RejectReason::from_rejection(
                400,
                "expiration_seconds cannot be less than 600"
            ),
            RejectReason::ExpirationBelowMinimum
        );
        assert_eq!(
            RejectReason::from_rejection(
                400,
                "maximum number of non expired bindings reached: 10"
            ),
            RejectReason::QuotaExceeded
        );
        assert_eq!(
            RejectReason::from_rejection(409, "binding already exists"),
            RejectReason::Conflict
        );
        assert_eq!(
            RejectReason::from_rejection(400, "malformed"),
            RejectReason::Other(400)
        );
    }

    #[test]
    fn test_transport_errors_are_not_outcomes() {
        let result: std::result::Result<Binding, ApiError> =
            Err(ApiError::Transport("reset".to_string()));
        assert!(matches!(
            Outcome::of_get(&result),
            Err(ScenarioError::Api(ApiError::Transport(_)))
        ));
    }

    #[tokio::test]
    async fn test_tracker_full_lifecycle() {
        let mut tracker = BindingTracker::new(BindingRules::default());
        let params = BindingParameters::with_expiration(900);

        let outcome = tracker
            .record_create("b1", &params, &Ok(CreateOutcome::Created(make_binding("b1"))))
            .unwrap();
        assert_eq!(outcome, Outcome::Created);
        assert!(matches!(tracker.state("b1"), BindingState::Live { .. }));

        tracker.record_get("b1", &Ok(make_binding("b1"))).unwrap();
        tracker.record_delete("b1", &Ok(())).unwrap();
        assert_eq!(tracker.state("b1"), BindingState::Deleted);

        let not_found = Err(ApiError::NotFound {
            description: "not found".to_string(),
        });
        assert_eq!(tracker.record_get("b1", &not_found).unwrap(), Outcome::NotFound);

        let gone = Err(ApiError::Gone {
            description: "gone".to_string(),
        });
        assert_eq!(tracker.record_delete("b1", &gone).unwrap(), Outcome::Gone);
    }

    #[tokio::test]
    async fn test_tracker_rejects_unexpected_outcome() {
        let mut tracker = BindingTracker::new(BindingRules::default());
        let params = BindingParameters::with_expiration(1);

        let result = tracker.record_create(
            "b2",
            &params,
            &Ok(CreateOutcome::Created(make_binding("b2"))),
        );

        assert!(matches!(result, Err(ScenarioError::Assertion(_))));
        assert_eq!(tracker.state("b2"), BindingState::Absent);
    }

    #[tokio::test]
    async fn test_tracker_rejected_create_leaves_state() {
        let mut tracker = BindingTracker::new(BindingRules::default());
        let params = BindingParameters::with_expiration(800);
        tracker
            .record_create("b3", &params, &Ok(CreateOutcome::Created(make_binding("b3"))))
            .unwrap();

        let conflict = Err(rejected(409, "conflict"));
        let outcome = tracker
            .record_create("b3", &BindingParameters::with_expiration(801), &conflict)
            .unwrap();

        assert_eq!(outcome, Outcome::Rejected(RejectReason::Conflict));
        match tracker.state("b3") {
            BindingState::Live { parameters, .. } => assert_eq!(parameters, params),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_applies_expiry() {
        let mut tracker = BindingTracker::new(BindingRules::default());
        let params = BindingParameters::with_expiration(600);
        tracker
            .record_create("b4", &params, &Ok(CreateOutcome::Created(make_binding("b4"))))
            .unwrap();

        tokio::time::advance(Duration::from_secs(601)).await;

        assert!(matches!(tracker.state("b4"), BindingState::Expired { .. }));
        let not_found = ApiError::NotFound {
            description: "expired".to_string(),
        };
        assert_eq!(
            tracker.record_get("b4", &Err(not_found.clone())).unwrap(),
            Outcome::NotFound
        );
        tracker.record_delete("b4", &Err(not_found)).unwrap();
        assert_eq!(tracker.state("b4"), BindingState::Deleted);
    }
}
