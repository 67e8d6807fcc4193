//! Single-writer lease on a remote prefix
//!
//! The lease is a small JSON object at `<prefix>/.rpmrepo.lock` created with
//! a conditional write, so only one run can hold it. An expired lease left
//! behind by a crashed run is taken over once. Release is explicit and only
//! removes the object while it still names this owner.

use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LeaseConfig;
use crate::error::{RepoError, Result};
use crate::prefix::RemotePrefix;
use crate::store::{ObjectStore, StoreError};

pub const LEASE_OBJECT: &str = ".rpmrepo.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LeaseRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A held lease; hand it back to [`Lease::release`] when the run ends
#[derive(Debug)]
pub struct Lease {
    key: String,
    record: LeaseRecord,
}

impl Lease {
    pub fn key_for(prefix: &RemotePrefix) -> String {
        prefix.key_for(LEASE_OBJECT)
    }

    /// A fresh owner id: process id plus random suffix
    pub fn new_owner() -> String {
        format!("pid{}-{:016x}", std::process::id(), rand::random::<u64>())
    }

    pub fn record(&self) -> &LeaseRecord {
        &self.record
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn acquire(
        store: &dyn ObjectStore,
        prefix: &RemotePrefix,
        config: &LeaseConfig,
        owner: String,
    ) -> Result<Self> {
        let key = Self::key_for(prefix);
        let ttl = ChronoDuration::from_std(config.ttl)
            .map_err(|e| RepoError::validation(format!("invalid lease ttl: {}", e)))?;

        // second attempt only after clearing an expired lease
        for attempt in 0..2 {
            let now = Utc::now();
            let record = LeaseRecord {
                owner: owner.clone(),
                acquired_at: now,
                expires_at: now + ttl,
            };
            let body = serde_json::to_vec(&record).map_err(|e| {
                RepoError::remote("lease", &key, StoreError::Io(e.to_string()))
            })?;

            let created = store
                .put_if_absent(&key, Bytes::from(body))
                .await
                .map_err(|e| RepoError::remote("lease", &key, e))?;
            if created {
                info!(key = %key, owner = %record.owner, expires_at = %record.expires_at, "lease acquired");
                return Ok(Self { key, record });
            }

            let current = Self::read(store, &key).await?;
            match current {
                Some(held) if !held.is_expired(Utc::now()) || attempt > 0 => {
                    return Err(RepoError::LeaseHeld {
                        key,
                        owner: held.owner,
                        expires_at: held.expires_at.to_rfc3339(),
                    });
                }
                Some(held) => {
                    warn!(key = %key, owner = %held.owner, "taking over expired lease");
                    let report = store.delete_batch(std::slice::from_ref(&key)).await;
                    if let Some(failure) = report.failures.into_iter().next() {
                        return Err(RepoError::remote(
                            "lease",
                            &key,
                            StoreError::Service {
                                code: "DeleteFailed".to_string(),
                                message: failure.message,
                            },
                        ));
                    }
                }
                // released between our write and read; try again
                None => {}
            }
        }

        Err(RepoError::LeaseHeld {
            key,
            owner: "unknown".to_string(),
            expires_at: "unknown".to_string(),
        })
    }

    async fn read(store: &dyn ObjectStore, key: &str) -> Result<Option<LeaseRecord>> {
        let Some(bytes) = store
            .get_bytes(key)
            .await
            .map_err(|e| RepoError::remote("lease", key, e))?
        else {
            return Ok(None);
        };
        match serde_json::from_slice::<LeaseRecord>(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // unreadable lease objects are treated as expired
                warn!(key, error = %e, "ignoring malformed lease object");
                Ok(Some(LeaseRecord {
                    owner: "malformed".to_string(),
                    acquired_at: DateTime::<Utc>::MIN_UTC,
                    expires_at: DateTime::<Utc>::MIN_UTC,
                }))
            }
        }
    }

    /// Remove the lease object if it still belongs to this owner. Failures
    /// are logged; the lease then simply expires.
    pub async fn release(self, store: &dyn ObjectStore) {
        match Self::read(store, &self.key).await {
            Ok(Some(current)) if current.owner == self.record.owner => {
                let report = store.delete_batch(std::slice::from_ref(&self.key)).await;
                if report.all_succeeded() {
                    info!(key = %self.key, "lease released");
                } else {
                    warn!(key = %self.key, "failed to release lease; it will expire");
                }
            }
            Ok(_) => warn!(key = %self.key, "lease no longer owned by this run"),
            Err(e) => warn!(key = %self.key, error = %e, "could not read lease during release"),
        }
    }
}
