// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod lifecycle;

pub use lifecycle::{
    AbsentDeletePolicy, BindingAction, BindingRules, BindingState, BindingTracker, Expectation,
    Outcome, RejectReason,
};
