// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod binding;
pub mod client;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod ids;
pub mod instrument;
pub mod kubeconfig;
pub mod quota;
pub mod scenarios;
pub mod types;
pub mod wait;

#[cfg(test)]
pub mod test_utils;
