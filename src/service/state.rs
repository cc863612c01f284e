use crate::common::{Config, DataLayout, Result, VisiRideError};
use crate::core::classifier::{Classifier, FaceDetector};
use crate::core::face_match::{FaceMatchCoordinator, MatchOutcome};
use crate::core::in_flight::InFlight;
use crate::core::proximity::ProximityTracker;
use crate::core::state_machine::{Decision, ScooterStateMachine};
use crate::core::upload::{decode_base64, ChunkOutcome, ChunkedUploadAssembler};
use crate::service::protocol::{
    parse_location, parse_location_text, required, AddScooterQuery, FormFields,
    FreeScooterRequest, ScooterView, SignInQuery, SignUpOutcome, SignUpRequest,
    UserLocationRequest, UserView, BAD_CREDENTIALS, SCOOTER_ADDED,
};
use crate::storage::credentials::{hash_password, verify_password};
use crate::storage::records::{is_valid_username, validate_identifier};
use crate::storage::{with_retry, ScooterRecord, Store, UserRecord};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Reply to a `/checkFace` request.
pub struct CheckFaceReply {
    pub message: String,
    /// Background classification started by the final chunk.
    pub classification: Option<JoinHandle<MatchOutcome>>,
}

/// Shared state behind every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub layout: DataLayout,
    pub store: Arc<dyn Store>,
    pub tracker: Arc<ProximityTracker>,
    pub state_machine: Arc<ScooterStateMachine>,
    pub assembler: Arc<ChunkedUploadAssembler>,
    pub coordinator: Arc<FaceMatchCoordinator>,
    pub detector: Arc<dyn FaceDetector>,
}

impl AppState {
    pub fn new(
        config: Config,
        layout: DataLayout,
        store: Arc<dyn Store>,
        classifier: Arc<dyn Classifier>,
        detector: Arc<dyn FaceDetector>,
    ) -> Self {
        let tracker = Arc::new(ProximityTracker::new(config.proximity.radius_meters));
        let in_flight = InFlight::new();
        let state_machine = Arc::new(ScooterStateMachine::new(tracker.clone(), in_flight.clone()));
        let assembler = Arc::new(ChunkedUploadAssembler::new(layout.clone()));

        // Backstop above the recognizer's own deadline
        let timeout = config.classifier.timeout() + Duration::from_secs(2);
        let coordinator = Arc::new(FaceMatchCoordinator::new(
            store.clone(),
            tracker.clone(),
            classifier,
            in_flight,
            layout.clone(),
            (config.classifier.probe_width, config.classifier.probe_height),
            timeout,
            config.retry.clone(),
        ));

        Self {
            config: Arc::new(config),
            layout,
            store,
            tracker,
            state_machine,
            assembler,
            coordinator,
            detector,
        }
    }

    /// Build every scooter's proximity set from stored positions.
    pub async fn seed_proximity(&self) -> Result<()> {
        let scooters = with_retry(&self.config.retry, "list_scooters", || self.store.list_scooters()).await?;
        let users = with_retry(&self.config.retry, "list_users", || self.store.list_users()).await?;

        self.tracker.seed(
            scooters.iter().map(|s| (s.scooter_id.as_str(), s.location)),
            users.iter().map(|u| (u.username.as_str(), u.location)),
        );
        Ok(())
    }

    pub async fn add_scooter(&self, query: AddScooterQuery) -> Result<&'static str> {
        let scooter_id = required(query.scooter_id.as_deref(), "scooterId")?;
        validate_identifier("scooterId", scooter_id)?;
        let charge = query.charge.as_deref().unwrap_or("").trim();
        let location = parse_location_text(query.lat.as_deref(), query.lon.as_deref())?;

        let scooter = ScooterRecord::new(scooter_id, charge, location);
        with_retry(&self.config.retry, "insert_scooter", || self.store.insert_scooter(&scooter)).await?;

        self.layout.ensure_scooter(scooter_id)?;
        self.tracker.register(scooter_id);

        tracing::info!(scooter = scooter_id, "scooter provisioned");
        Ok(SCOOTER_ADDED)
    }

    /// User heartbeat. Unknown users get an empty list rather than an error.
    pub async fn update_user_location(&self, req: UserLocationRequest) -> Result<Vec<ScooterView>> {
        let username = required(req.username.as_deref(), "username")?;
        validate_identifier("username", username)?;
        let location = parse_location(req.lat.as_ref(), req.lon.as_ref())?;

        let known = with_retry(&self.config.retry, "update_user_location", || {
            self.store.update_user_location(username, location)
        })
        .await?;
        if !known {
            tracing::debug!(user = username, "location ping from unknown user");
            return Ok(Vec::new());
        }

        let scooters = with_retry(&self.config.retry, "list_scooters", || self.store.list_scooters()).await?;
        self.tracker.adjust_for_user(
            username,
            location,
            scooters.iter().map(|s| (s.scooter_id.as_str(), s.location)),
        );

        let assigned = with_retry(&self.config.retry, "scooters_assigned_to", || {
            self.store.scooters_assigned_to(username)
        })
        .await?;
        Ok(assigned.iter().map(ScooterView::from).collect())
    }

    /// Scooter heartbeat.
    pub async fn gps(&self, form: FormFields) -> Result<Decision> {
        let scooter_id = required(form.first("scooterId"), "scooterId")?;
        validate_identifier("scooterId", scooter_id)?;
        let fresh_fix = form.first("valid") == Some("true");

        let users = with_retry(&self.config.retry, "list_users", || self.store.list_users()).await?;
        let scooter = with_retry(&self.config.retry, "get_scooter", || self.store.get_scooter(scooter_id)).await?;
        let Some(mut scooter) = scooter else {
            tracing::debug!(scooter = scooter_id, "ping from unknown scooter");
            return Ok(Decision::Lock);
        };

        let location = if fresh_fix {
            let location = parse_location_text(form.first("lat"), form.first("lon"))?;
            with_retry(&self.config.retry, "update_scooter_location", || {
                self.store.update_scooter_location(scooter_id, location)
            })
            .await?;
            scooter.location = location;
            location
        } else {
            // No GPS fix; fall back to the last stored position
            scooter.location
        };

        Ok(self.state_machine.decide(&scooter, location, &users))
    }

    /// Chunked photo upload.
    pub async fn check_face(&self, form: FormFields) -> Result<CheckFaceReply> {
        let scooter_id = required(form.first("scooterId"), "scooterId")?;
        validate_identifier("scooterId", scooter_id)?;

        let declared_size = match form.first("size") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u32>()
                    .map_err(|_| VisiRideError::validation("Invalid size"))?,
            ),
            None => None,
        };

        let provisioned = with_retry(&self.config.retry, "get_scooter", || self.store.get_scooter(scooter_id)).await?;
        if provisioned.is_none() {
            return Err(VisiRideError::validation(format!("Unknown scooter {}", scooter_id)));
        }

        let chunks = form.others(&["scooterId", "size"]);
        let outcome = self.assembler.accept(scooter_id, declared_size, chunks).await?;
        let message = outcome.reply();

        let classification = match outcome {
            ChunkOutcome::Complete { probe } => Some(self.coordinator.submit(scooter_id.to_string(), probe)),
            ChunkOutcome::Pending { .. } => None,
        };

        Ok(CheckFaceReply { message, classification })
    }

    /// Release a scooter; returns the session length in milliseconds.
    pub async fn free_scooter(&self, req: FreeScooterRequest) -> Result<i64> {
        let scooter_id = required(req.scooter_id.as_deref(), "scooterId")?;
        let username = required(req.username.as_deref(), "username")?;
        validate_identifier("scooterId", scooter_id)?;
        validate_identifier("username", username)?;

        let user = with_retry(&self.config.retry, "get_user", || self.store.get_user(username))
            .await?
            .ok_or_else(|| VisiRideError::NotFound(format!("user {}", username)))?;

        with_retry(&self.config.retry, "set_assignment", || self.store.set_assignment(scooter_id, None)).await?;
        with_retry(&self.config.retry, "set_session_start", || self.store.set_session_start(username, 0)).await?;

        let elapsed = if user.has_session() {
            (chrono::Utc::now().timestamp_millis() - user.session_start).max(0)
        } else {
            0
        };

        tracing::info!(scooter = scooter_id, user = username, elapsed_ms = elapsed, "scooter released");
        Ok(elapsed)
    }

    pub async fn list_users(&self) -> Result<Vec<UserView>> {
        let users = with_retry(&self.config.retry, "list_users", || self.store.list_users()).await?;
        Ok(users.iter().map(UserView::from).collect())
    }

    pub async fn list_scooters(&self) -> Result<Vec<ScooterView>> {
        let scooters = with_retry(&self.config.retry, "list_scooters", || self.store.list_scooters()).await?;
        Ok(scooters.iter().map(ScooterView::from).collect())
    }

    pub async fn sign_up(&self, req: SignUpRequest) -> Result<SignUpOutcome> {
        let username = req.username.as_deref().unwrap_or("").to_string();
        if !is_valid_username(&username) {
            return Ok(SignUpOutcome::InvalidUsername);
        }
        let taken = with_retry(&self.config.retry, "get_user", || self.store.get_user(&username)).await?;
        if taken.is_some() {
            return Ok(SignUpOutcome::InvalidUsername);
        }

        let password = required(req.password.as_deref(), "password")?;
        let location = parse_location(req.lat.as_ref(), req.lon.as_ref())?;
        let image = required(req.image.as_deref(), "image")?.to_string();

        let photo = match decode_base64(&image) {
            Ok(photo) if !photo.is_empty() => photo,
            _ => return Ok(SignUpOutcome::InvalidPhoto),
        };
        if !self.photo_has_face(&username, photo).await {
            return Ok(SignUpOutcome::InvalidPhoto);
        }

        let user = UserRecord::new(&username, hash_password(password), location, image);
        match with_retry(&self.config.retry, "insert_user", || self.store.insert_user(&user)).await {
            Ok(()) => {}
            // Lost a race with a concurrent signup for the same name
            Err(VisiRideError::AlreadyExists(_)) => return Ok(SignUpOutcome::InvalidUsername),
            Err(e) => return Err(e),
        }

        tracing::info!(user = %username, "user signed up");
        Ok(SignUpOutcome::Added)
    }

    /// Liveness check via the external detector. Tool failures count as "no face".
    async fn photo_has_face(&self, username: &str, photo: Vec<u8>) -> bool {
        let dir = self.layout.signup_dir(username);
        let detector = self.detector.clone();
        let scratch = dir.clone();
        let file_name = format!("{}.jpg", username);

        let result = tokio::task::spawn_blocking(move || -> Result<bool> {
            fs::create_dir_all(&scratch)?;
            fs::write(scratch.join(file_name), photo)?;
            detector.contains_face(&scratch)
        })
        .await;

        if let Err(e) = fs::remove_dir_all(&dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove {}: {}", dir.display(), e);
            }
        }

        match result {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                tracing::warn!(user = username, "face detection failed: {}", e);
                false
            }
            Err(e) => {
                tracing::warn!(user = username, "face detection task failed: {}", e);
                false
            }
        }
    }

    /// Returns the stored reference photo on success.
    pub async fn sign_in(&self, query: SignInQuery) -> Result<String> {
        let username = required(query.username.as_deref(), "username")?;
        let password = query.password.as_deref().unwrap_or("");
        if validate_identifier("username", username).is_err() {
            return Ok(BAD_CREDENTIALS.to_string());
        }

        let user = with_retry(&self.config.retry, "get_user", || self.store.get_user(username)).await?;
        match user {
            Some(user) if verify_password(password, &user.password_hash) => Ok(user.image),
            _ => Ok(BAD_CREDENTIALS.to_string()),
        }
    }
}
