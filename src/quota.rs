// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Bounded retry loop that checks a server-side quota is enforced.
//!
//! The probe keeps creating resources with fresh ids until the server rejects
//! one with the quota message. It never asserts how many creates succeeded
//! first: other runs may already hold part of the quota.

use crate::constants::rejection;
use crate::error::{ApiError, ProbeError};
use crate::ids::IdGenerator;
use std::future::Future;
use tracing::{info, instrument, warn};

/// What a probe observed before the quota kicked in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Creates issued, the rejected one included
    pub attempts_made: usize,
    /// Ids of the resources that were created, for cleanup
    pub created_ids: Vec<String>,
    /// Description of the quota rejection
    pub rejection: String,
}

pub struct QuotaProbe<'a> {
    ids: &'a dyn IdGenerator,
    marker: &'a str,
}

impl<'a> QuotaProbe<'a> {
    /// Probe for the live-binding quota.
    pub fn new(ids: &'a dyn IdGenerator) -> Self {
        Self::with_marker(ids, rejection::QUOTA_EXCEEDED)
    }

    /// Probe recognising quota rejections by another description substring.
    pub fn with_marker(ids: &'a dyn IdGenerator, marker: &'a str) -> Self {
        Self { ids, marker }
    }

    /// Call `create` with fresh ids until the quota rejection shows up, at
    /// most `max_attempts` times. Any other failure stops the probe.
    #[instrument(skip(self, create))]
    pub async fn probe_until_rejected<T, F, Fut>(
        &self,
        mut create: F,
        max_attempts: usize,
    ) -> Result<ProbeOutcome, ProbeError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut created_ids = Vec::new();

        for attempt in 1..=max_attempts {
            let id = self.ids.next_id();
            match create(id.clone()).await {
                Ok(_) => {
                    info!("Attempt {}: created {}", attempt, id);
                    created_ids.push(id);
                }
                Err(ApiError::Rejected {
                    status: 400,
                    description,
                }) if description.contains(self.marker) => {
                    info!("Attempt {}: quota enforced: {}", attempt, description);
                    return Ok(ProbeOutcome {
                        attempts_made: attempt,
                        created_ids,
                        rejection: description,
                    });
                }
                Err(ApiError::Rejected {
                    status,
                    description,
                }) => {
                    warn!("Attempt {}: unexpected rejection: {}", attempt, description);
                    return Err(ProbeError::UnexpectedRejection {
                        attempt,
                        status,
                        description,
                        created_ids,
                    });
                }
                Err(source) => {
                    return Err(ProbeError::Api {
                        attempt,
                        source,
                        created_ids,
                    })
                }
            }
        }

        Err(ProbeError::QuotaNotEnforced {
            attempts: max_attempts,
            created_ids,
        })
    }
}
