//! Durable, coordinate-keyed checkpoints of an analysis session.

mod coordinate;
mod store;

pub use coordinate::{Coordinate, LOCALIZING, NARROWING};
pub use store::{PersistedState, SessionLock, StateStore};
