// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Timing helpers for scenario diagnostics.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Run `fut` and return its output with the time it took.
pub async fn measure<F>(fut: F) -> (F::Output, Duration)
where
    F: Future,
{
    let start = Instant::now();
    let output = fut.await;
    (output, start.elapsed())
}

/// Run `fut` and log how long it took, whatever the outcome.
pub async fn with_elapsed_time<F>(label: &str, fut: F) -> F::Output
where
    F: Future,
{
    let (output, elapsed) = measure(fut).await;
    info!(
        scenario = label,
        elapsed_ms = elapsed.as_millis() as u64,
        "Elapsed time: {} ms",
        elapsed.as_millis()
    );
    output
}
