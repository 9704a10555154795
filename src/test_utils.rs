// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: scripted operation sources, an in-memory broker and a mock
//! Kubernetes API service.

use crate::binding::BindingRules;
use crate::client::{
    BindingApi, InstanceApi, LatestOperationSource, OperationStatusSource,
};
use crate::constants::rejection;
use crate::error::{ApiError, Result as ScenarioResult, ScenarioError};
use crate::kubeconfig::AccessCheck;
use crate::types::{
    Binding, BindingParameters, CreateOutcome, Credentials, Operation, OperationState,
    OperationType,
};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use http::{Request, Response};
use kube::client::Body;
use kube::Client;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

/// Build an operation observation
pub fn operation(id: &str, state: OperationState) -> Operation {
    Operation {
        id: id.to_string(),
        instance_id: "instance-1".to_string(),
        operation_type: None,
        state,
        description: None,
        created_at: None,
    }
}

/// Operation source replaying a fixed list of answers. The last answer is
/// repeated once the list is exhausted.
pub struct ScriptedOperations {
    responses: Mutex<VecDeque<Result<Option<Operation>, ApiError>>>,
    last: Mutex<Option<Result<Option<Operation>, ApiError>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedOperations {
    pub fn new(responses: Vec<Result<Option<Operation>, ApiError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Every answer takes this long to arrive
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next(&self) -> Result<Option<Operation>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last.clone().unwrap_or(Ok(None)),
        }
    }
}

#[async_trait]
impl OperationStatusSource for ScriptedOperations {
    async fn operation(
        &self,
        _instance_id: &str,
        _operation_id: &str,
    ) -> Result<Option<Operation>, ApiError> {
        self.next().await
    }
}

#[async_trait]
impl LatestOperationSource for ScriptedOperations {
    async fn latest_operation(
        &self,
        _instance_id: &str,
        operation_type: OperationType,
    ) -> Result<Option<Operation>, ApiError> {
        self.next().await.map(|op| {
            op.map(|mut op| {
                op.operation_type = Some(operation_type);
                op
            })
        })
    }
}

/// Kubeconfig whose bearer token is a JWT valid for `seconds`
pub fn kubeconfig_with_validity(seconds: u64) -> String {
    let issued_at: u64 = 1_714_557_600;
    let claims = serde_json::json!({
        "iss": "kubernetes/serviceaccount",
        "sub": "system:serviceaccount:kyma-system:binding",
        "iat": issued_at,
        "exp": issued_at + seconds,
    });
    let token = format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        URL_SAFE_NO_PAD.encode("signature")
    );
    format!(
        r#"apiVersion: v1
kind: Config
clusters:
  - name: shoot
    cluster:
      server: https://api.shoot.example.com
contexts:
  - name: shoot
    context:
      cluster: shoot
      user: binding
current-context: shoot
users:
  - name: binding
    user:
      token: {token}
"#
    )
}

#[derive(Debug, Clone)]
struct FakeBinding {
    parameters: BindingParameters,
    kubeconfig: String,
    deleted: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    bindings: HashMap<String, FakeBinding>,
    operations: HashMap<String, VecDeque<OperationState>>,
    next_operation: usize,
}

/// In-memory broker following the binding rules it is built with.
pub struct FakeControlPlane {
    rules: BindingRules,
    /// Live bindings held by someone else
    foreign_live: usize,
    enforce_quota: bool,
    absent_delete_status: u16,
    final_state: OperationState,
    state: Mutex<FakeState>,
}

impl FakeControlPlane {
    pub fn new(rules: BindingRules) -> Self {
        Self {
            rules,
            foreign_live: 0,
            enforce_quota: true,
            absent_delete_status: 404,
            final_state: OperationState::Succeeded,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_foreign_bindings(mut self, count: usize) -> Self {
        self.foreign_live = count;
        self
    }

    pub fn without_quota(mut self) -> Self {
        self.enforce_quota = false;
        self
    }

    pub fn with_absent_delete_status(mut self, status: u16) -> Self {
        self.absent_delete_status = status;
        self
    }

    /// Operations started from now on end in this state
    pub fn with_operations_ending_in(mut self, state: OperationState) -> Self {
        self.final_state = state;
        self
    }

    pub fn live_bindings(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.bindings.values().filter(|b| !b.deleted).count()
    }

    fn start_operation(&self) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_operation += 1;
        let id = format!("op-{}", state.next_operation);
        state.operations.insert(
            id.clone(),
            VecDeque::from(vec![
                OperationState::Pending,
                OperationState::InProgress,
                self.final_state,
            ]),
        );
        id
    }

    fn binding(instance_id: &str, binding_id: &str, fake: &FakeBinding) -> Binding {
        Binding {
            id: binding_id.to_string(),
            instance_id: instance_id.to_string(),
            credentials: Credentials {
                kubeconfig: fake.kubeconfig.clone(),
            },
            metadata: Default::default(),
        }
    }
}

#[async_trait]
impl BindingApi for FakeControlPlane {
    async fn create_binding(
        &self,
        instance_id: &str,
        binding_id: &str,
        parameters: &BindingParameters,
    ) -> Result<CreateOutcome, ApiError> {
        let expiration = parameters.effective_expiration(self.rules.default_expiration_secs);
        if expiration < self.rules.min_expiration_secs {
            return Err(ApiError::from_status(
                400,
                format!(
                    "{} {}",
                    rejection::EXPIRATION_BELOW_MIN,
                    self.rules.min_expiration_secs
                ),
            ));
        }
        if expiration > self.rules.max_expiration_secs {
            return Err(ApiError::from_status(
                400,
                format!(
                    "{} {}",
                    rejection::EXPIRATION_ABOVE_MAX,
                    self.rules.max_expiration_secs
                ),
            ));
        }

        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.bindings.get(binding_id).filter(|b| !b.deleted) {
            let default = self.rules.default_expiration_secs;
            if existing.parameters.fingerprint(default) == parameters.fingerprint(default) {
                return Ok(CreateOutcome::Existing(Self::binding(
                    instance_id,
                    binding_id,
                    existing,
                )));
            }
            return Err(ApiError::from_status(
                409,
                "binding already exists with different parameters",
            ));
        }

        let live = state.bindings.values().filter(|b| !b.deleted).count() + self.foreign_live;
        if self.enforce_quota && live >= self.rules.max_live_bindings {
            return Err(ApiError::from_status(
                400,
                format!("{}: {}", rejection::QUOTA_EXCEEDED, self.rules.max_live_bindings),
            ));
        }

        let fake = FakeBinding {
            parameters: parameters.clone(),
            kubeconfig: kubeconfig_with_validity(expiration),
            deleted: false,
        };
        let binding = Self::binding(instance_id, binding_id, &fake);
        state.bindings.insert(binding_id.to_string(), fake);
        Ok(CreateOutcome::Created(binding))
    }

    async fn get_binding(&self, instance_id: &str, binding_id: &str) -> Result<Binding, ApiError> {
        let state = self.state.lock().unwrap();
        match state.bindings.get(binding_id) {
            Some(fake) if !fake.deleted => Ok(Self::binding(instance_id, binding_id, fake)),
            _ => Err(ApiError::from_status(404, "binding not found")),
        }
    }

    async fn delete_binding(&self, _instance_id: &str, binding_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        match state.bindings.get_mut(binding_id) {
            Some(fake) if !fake.deleted => {
                fake.deleted = true;
                Ok(())
            }
            Some(_) => Err(ApiError::from_status(410, "binding already deleted")),
            None => Err(ApiError::from_status(
                self.absent_delete_status,
                "binding does not exist",
            )),
        }
    }
}

#[async_trait]
impl InstanceApi for FakeControlPlane {
    async fn provision(&self, _instance_id: &str, _name: &str) -> Result<String, ApiError> {
        Ok(self.start_operation())
    }

    async fn deprovision(&self, _instance_id: &str) -> Result<String, ApiError> {
        Ok(self.start_operation())
    }
}

#[async_trait]
impl OperationStatusSource for FakeControlPlane {
    async fn operation(
        &self,
        instance_id: &str,
        operation_id: &str,
    ) -> Result<Option<Operation>, ApiError> {
        let mut state = self.state.lock().unwrap();
        let Some(progress) = state.operations.get_mut(operation_id) else {
            return Ok(None);
        };
        let current = if progress.len() > 1 {
            progress.pop_front()
        } else {
            progress.front().copied()
        };
        Ok(current.map(|s| Operation {
            instance_id: instance_id.to_string(),
            description: (s == OperationState::Failed).then(|| "operation failed".to_string()),
            ..operation(operation_id, s)
        }))
    }
}

/// Access check that records the kubeconfigs it was asked about.
#[derive(Default)]
pub struct RecordingAccess {
    checked: Mutex<Vec<String>>,
    deny: bool,
}

impl RecordingAccess {
    pub fn denying() -> Self {
        Self {
            checked: Mutex::new(Vec::new()),
            deny: true,
        }
    }

    pub fn checked(&self) -> Vec<String> {
        self.checked.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccessCheck for RecordingAccess {
    async fn check(&self, kubeconfig: &str) -> ScenarioResult<()> {
        self.checked.lock().unwrap().push(kubeconfig.to_string());
        if self.deny {
            return Err(ScenarioError::Kubeconfig("access denied".to_string()));
        }
        Ok(())
    }
}

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(("GET".to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();
        responses
            .get(&(method.to_string(), path.to_string()))
            .cloned()
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let (status, body) = self.find_response(&method, &path).unwrap_or_else(|| {
            (
                404,
                serde_json::json!({
                    "kind": "Status",
                    "apiVersion": "v1",
                    "status": "Failure",
                    "message": format!("{} not found", path),
                    "reason": "NotFound",
                    "code": 404
                })
                .to_string(),
            )
        });

        Box::pin(async move {
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a mock secret JSON response
pub fn secret_json(name: &str, namespace: &str) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": "test-uid"
        },
        "data": {
            "clientid": "Y2xpZW50",
            "sm_url": "aHR0cHM6Ly9zZXJ2aWNlLW1hbmFnZXIuZXhhbXBsZS5jb20="
        }
    })
    .to_string()
}
