// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Wait-until primitives for long-running control-plane operations.

pub mod latest;
pub mod poller;

pub use latest::LatestOperationWaiter;
pub use poller::OperationPoller;

use std::time::Duration;
use tokio::time::Instant;

/// Overall budget of a wait, shared by every tick.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    start: Instant,
    end: Instant,
}

impl Deadline {
    pub(crate) fn after(timeout: Duration) -> Self {
        let start = Instant::now();
        Self {
            start,
            end: start + timeout,
        }
    }

    /// Time left, `None` once the deadline has passed.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        (now < self.end).then(|| self.end - now)
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Sleep for `interval`, clipped to the time left. Returns false when
    /// there is no time left to wait.
    pub(crate) async fn sleep(&self, interval: Duration) -> bool {
        match self.remaining() {
            Some(left) => {
                tokio::time::sleep(interval.min(left)).await;
                true
            }
            None => false,
        }
    }
}
