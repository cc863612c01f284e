// Core modules
pub mod common;
pub mod core;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use common::{Config, DataLayout, DevMode, Result, VisiRideError};
pub use core::{
    Classifier, Decision, FaceDetector, FaceMatchCoordinator, Location, MatchOutcome, MatchResult,
    ProximityTracker,
};
pub use service::{protocol, AppState};
pub use storage::{FileStore, MemoryStore, ScooterRecord, Store, UserRecord};
