//! SQLite persistence.
//!
//! Functions that issue a single statement are generic over the executor;
//! anything that needs several statements takes a connection so callers can
//! hand in a transaction (`&mut *tx`) and keep the whole operation atomic.
//! Every lookup is scoped by owner; a row owned by someone else is reported
//! exactly like a missing one.

pub mod days;
pub mod exercises;
pub mod mesocycles;
pub mod sets;

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
