// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Broker (OSB API) constants
pub mod broker {
    /// Service offered by the broker
    pub const KYMA_SERVICE_ID: &str = "47c9dcbf-ff30-448e-ab36-d3bad66ba281";
    pub const TRIAL_PLAN_ID: &str = "7d55d31d-35ae-4438-bf13-6ffdfa107d9f";
    pub const API_VERSION_HEADER: &str = "X-Broker-API-Version";
    pub const API_VERSION: &str = "2.14";
    pub const TOKEN_SCOPE: &str = "broker:write";
}

/// Binding limits enforced by the broker
pub mod binding {
    pub const DEFAULT_EXPIRATION_SECS: u64 = 600;
    pub const MIN_EXPIRATION_SECS: u64 = 600;
    pub const MAX_EXPIRATION_SECS: u64 = 7200;
    pub const MAX_LIVE_BINDINGS: usize = 10;
    /// Extra attempts a quota probe makes past the expected limit
    pub const QUOTA_PROBE_SLACK: usize = 3;
    /// Allowed difference between requested and observed kubeconfig validity
    pub const VALIDITY_TOLERANCE_SECS: u64 = 5;
    /// Extreme out-of-range requests, tried besides the range edges
    pub const FAR_BELOW_MIN_EXPIRATION_SECS: u64 = 1;
    pub const FAR_ABOVE_MAX_EXPIRATION_SECS: u64 = 1_000_000_000;
}

/// Substrings of the broker's 400 descriptions
pub mod rejection {
    pub const EXPIRATION_BELOW_MIN: &str = "expiration_seconds cannot be less than";
    pub const EXPIRATION_ABOVE_MAX: &str = "expiration_seconds cannot be greater than";
    pub const QUOTA_EXCEEDED: &str = "maximum number of non expired bindings reached";
}

/// Wait budgets for the lifecycle scenarios
pub mod timeouts {
    use std::time::Duration;

    pub const POLL_INTERVAL: Duration = Duration::from_secs(30);
    pub const PROVISIONING: Duration = Duration::from_secs(30 * 60);
    pub const SUSPENSION: Duration = Duration::from_secs(60 * 60);
    pub const TRIAL_CLEANUP_TRIGGER: Duration = Duration::from_secs(11 * 60);
    pub const DEPROVISIONING: Duration = Duration::from_secs(95 * 60);
    /// A suspended instance has no cluster left to tear down
    pub const DEPROVISIONING_AFTER_SUSPENSION: Duration = Duration::from_secs(5 * 60);
    pub const HTTP_REQUEST: Duration = Duration::from_secs(30);
}

/// Secret every provisioned cluster carries, used to check binding access
pub mod access_check {
    pub const SECRET_NAME: &str = "sap-btp-manager";
    pub const NAMESPACE: &str = "kyma-system";
}
