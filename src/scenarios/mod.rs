// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle scenarios run against a provisioned instance.

pub mod binding;
pub mod instance;
pub mod suspension;

pub use binding::{run_binding_suite, BindingScenario};
pub use instance::{deprovision, ensure_operation_succeeded, provision};
pub use suspension::trial_suspension;
