// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Data types exchanged with the broker and the control plane.

pub mod binding;
pub mod operation;

pub use binding::{Binding, BindingParameters, CreateOutcome, Credentials};
pub use operation::{Operation, OperationState, OperationType};
