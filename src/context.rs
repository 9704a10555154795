// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::binding::{BindingRules, BindingTracker};
use crate::client::{
    BindingApi, InstanceApi, KcpClient, KebClient, LatestOperationSource, OperationStatusSource,
};
use crate::config::Config;
use crate::error::ApiError;
use crate::ids::{IdGenerator, UuidGenerator};
use crate::kubeconfig::{AccessCheck, ClusterAccess};
use crate::wait::{LatestOperationWaiter, OperationPoller};
use std::sync::Arc;
use std::time::Duration;

/// Everything a scenario talks to, passed explicitly into each scenario.
#[derive(Clone)]
pub struct TestContext {
    pub instance_id: String,
    pub bindings: Arc<dyn BindingApi>,
    pub instances: Arc<dyn InstanceApi>,
    pub operations: Arc<dyn OperationStatusSource>,
    /// Only set when the control-plane runtime API is configured
    pub runtimes: Option<Arc<dyn LatestOperationSource>>,
    pub access: Arc<dyn AccessCheck>,
    pub ids: Arc<dyn IdGenerator>,
    pub rules: BindingRules,
    pub poll_interval: Duration,
}

impl TestContext {
    /// Wire up the real broker and control-plane clients.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let keb = Arc::new(KebClient::new(config.keb.clone())?);
        let runtimes = match &config.kcp {
            Some(kcp) => {
                Some(Arc::new(KcpClient::new(kcp.clone())?) as Arc<dyn LatestOperationSource>)
            }
            None => None,
        };

        Ok(Self {
            instance_id: config.instance_id.clone(),
            bindings: keb.clone(),
            instances: keb.clone(),
            operations: keb,
            runtimes,
            access: Arc::new(ClusterAccess),
            ids: Arc::new(UuidGenerator),
            rules: config.rules.clone(),
            poll_interval: config.poll_interval,
        })
    }

    pub fn poller(&self) -> OperationPoller<'_> {
        OperationPoller::new(self.operations.as_ref(), self.poll_interval)
    }

    pub fn latest_waiter(&self) -> Option<LatestOperationWaiter<'_>> {
        self.runtimes
            .as_deref()
            .map(|source| LatestOperationWaiter::new(source, self.poll_interval))
    }

    /// Fresh tracker for the bindings of one scenario
    pub fn tracker(&self) -> BindingTracker {
        BindingTracker::new(self.rules.clone())
    }
}
