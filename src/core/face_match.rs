use crate::common::config::RetryConfig;
use crate::common::{DataLayout, Result, VisiRideError};
use crate::core::classifier::{Classifier, MatchResult};
use crate::core::in_flight::InFlight;
use crate::core::probe;
use crate::core::proximity::{ProximitySet, ProximityTracker};
use crate::core::upload::decode_base64;
use crate::storage::{with_retry, Store};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Scooter assigned to this user and their session started.
    Assigned(String),
    NoMatch,
    /// Classification could not complete; treated like a non-match.
    Failed(String),
}

pub struct FaceMatchCoordinator {
    store: Arc<dyn Store>,
    tracker: Arc<ProximityTracker>,
    classifier: Arc<dyn Classifier>,
    in_flight: Arc<InFlight>,
    layout: DataLayout,
    probe_size: (u32, u32),
    timeout: Duration,
    retry: RetryConfig,
}

impl FaceMatchCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        tracker: Arc<ProximityTracker>,
        classifier: Arc<dyn Classifier>,
        in_flight: Arc<InFlight>,
        layout: DataLayout,
        probe_size: (u32, u32),
        timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            tracker,
            classifier,
            in_flight,
            layout,
            probe_size,
            timeout,
            retry,
        }
    }

    pub fn in_flight(&self) -> &Arc<InFlight> {
        &self.in_flight
    }

    /// Classify off the request path. The returned handle may be dropped.
    pub fn submit(self: &Arc<Self>, scooter_id: String, probe: Vec<u8>) -> JoinHandle<MatchOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.run(&scooter_id, probe).await })
    }

    /// Wait for the in-flight flag, classify, apply the result and clean up.
    ///
    /// The flag is held until the assignment is written so the scooter's next
    /// ping already sees it.
    pub async fn run(&self, scooter_id: &str, probe: Vec<u8>) -> MatchOutcome {
        let _guard = self.in_flight.acquire().await;
        tracing::info!(scooter = scooter_id, "face match started");

        let outcome = match self.classify(scooter_id, &probe).await {
            Ok(MatchResult::Recognized(username)) => match self.apply_match(scooter_id, &username).await {
                Ok(()) => {
                    tracing::info!(scooter = scooter_id, user = %username, "face recognized, scooter assigned");
                    MatchOutcome::Assigned(username)
                }
                Err(e) => {
                    tracing::error!(scooter = scooter_id, "failed to record match: {}", e);
                    MatchOutcome::Failed(e.to_string())
                }
            },
            Ok(result) => {
                tracing::info!(scooter = scooter_id, ?result, "face not recognized");
                MatchOutcome::NoMatch
            }
            Err(e) => {
                tracing::warn!(scooter = scooter_id, "classification failed: {}", e);
                MatchOutcome::Failed(e.to_string())
            }
        };

        self.cleanup(scooter_id);
        outcome
    }

    async fn classify(&self, scooter_id: &str, probe_bytes: &[u8]) -> Result<MatchResult> {
        let candidates = self.tracker.members(scooter_id);
        if candidates.is_empty() {
            return Ok(MatchResult::NoPersonsFound);
        }

        // Probe: decode -> resize -> write
        let probe_path = self.layout.probe_file(scooter_id);
        let (width, height) = self.probe_size;
        {
            let bytes = probe_bytes.to_vec();
            let dest = probe_path.clone();
            tokio::task::spawn_blocking(move || probe::write_probe(&bytes, width, height, &dest))
                .await
                .map_err(|e| VisiRideError::Other(anyhow::anyhow!("probe task failed: {}", e)))??;
        }

        // Gallery: one reference photo per nearby user
        let gallery_dir = self.layout.gallery_dir(scooter_id);
        let written = self.build_gallery(&gallery_dir, &candidates).await?;
        if written.is_empty() {
            return Ok(MatchResult::NoPersonsFound);
        }

        let classifier = self.classifier.clone();
        let call = tokio::task::spawn_blocking(move || classifier.classify(&probe_path, &gallery_dir));
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => {
                return Err(VisiRideError::ExternalTool(format!("classifier crashed: {}", join_err)));
            }
            Err(_) => {
                return Err(VisiRideError::ExternalTool(format!(
                    "classifier timed out after {:?}", self.timeout
                )));
            }
        };

        // Only candidates placed in the gallery can be matched
        match result {
            MatchResult::Recognized(name) if !written.contains(&name) => {
                tracing::warn!(scooter = scooter_id, name = %name, "classifier returned a non-candidate");
                Ok(MatchResult::UnknownPerson)
            }
            other => Ok(other),
        }
    }

    async fn build_gallery(&self, gallery_dir: &Path, candidates: &ProximitySet) -> Result<ProximitySet> {
        fs::create_dir_all(gallery_dir)?;
        clear_dir(gallery_dir);

        let mut written = ProximitySet::new();
        for username in candidates {
            let user = with_retry(&self.retry, "get_user", || self.store.get_user(username)).await?;
            let Some(user) = user else {
                tracing::debug!(user = %username, "nearby user no longer in store");
                continue;
            };

            match decode_base64(&user.image) {
                Ok(photo) if !photo.is_empty() => {
                    fs::write(gallery_dir.join(format!("{}.jpg", username)), photo)?;
                    written.insert(username.clone());
                }
                Ok(_) => tracing::debug!(user = %username, "no reference photo"),
                Err(e) => tracing::warn!(user = %username, "unreadable reference photo: {}", e),
            }
        }
        Ok(written)
    }

    async fn apply_match(&self, scooter_id: &str, username: &str) -> Result<()> {
        let assigned = with_retry(&self.retry, "set_assignment", || {
            self.store.set_assignment(scooter_id, Some(username))
        })
        .await?;
        if !assigned {
            return Err(VisiRideError::NotFound(format!("scooter {}", scooter_id)));
        }

        let now = chrono::Utc::now().timestamp_millis();
        let started = with_retry(&self.retry, "set_session_start", || {
            self.store.set_session_start(username, now)
        })
        .await?;
        if !started {
            return Err(VisiRideError::NotFound(format!("user {}", username)));
        }
        Ok(())
    }

    fn cleanup(&self, scooter_id: &str) {
        clear_dir(&self.layout.gallery_dir(scooter_id));
        let probe = self.layout.probe_file(scooter_id);
        if let Err(e) = fs::remove_file(&probe) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove {}: {}", probe.display(), e);
            }
        }
    }
}

fn clear_dir(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        if let Err(e) = fs::remove_file(entry.path()) {
            tracing::warn!("failed to remove {}: {}", entry.path().display(), e);
        }
    }
}
