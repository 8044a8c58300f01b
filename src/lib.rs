pub mod calendar;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod logging;
pub mod models;
pub mod notify;
pub mod progress;
pub mod search;
pub mod session;
pub mod store;
pub mod tracker;
pub mod types;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use error::{AppError, Result};
pub use tracker::Tracker;
pub use types::OutputFmt;
