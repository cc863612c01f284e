pub mod protocol;
pub mod router;
pub mod state;

pub use router::{router, serve};
pub use state::{AppState, CheckFaceReply};
