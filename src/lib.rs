pub mod engine;
pub mod errors;
pub mod executor;
pub mod fixtures;
pub mod logging;
pub mod oracle;
pub mod phase;
pub mod pilot_config;
pub mod reply;
pub mod session;
pub mod state;
