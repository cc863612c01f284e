pub mod classifier;
pub mod face_match;
pub mod geo;
pub mod in_flight;
pub mod probe;
pub mod proximity;
pub mod state_machine;
pub mod upload;

pub use classifier::{Classifier, FaceDetector, MatchResult};
pub use face_match::{FaceMatchCoordinator, MatchOutcome};
pub use geo::Location;
pub use in_flight::InFlight;
pub use proximity::ProximityTracker;
pub use state_machine::{Decision, ScooterStateMachine};
pub use upload::{ChunkOutcome, ChunkedUploadAssembler};
