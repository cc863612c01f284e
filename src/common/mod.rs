pub mod config;
pub mod dev_mode;
pub mod error;
pub mod logging;
pub mod paths;

pub use config::Config;
pub use dev_mode::DevMode;
pub use error::{Result, VisiRideError};
pub use paths::DataLayout;
