pub mod algorithms;
pub mod api;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod functions;
pub mod middlewares;
pub mod queries;
pub mod session;
pub mod store;
pub mod tracker;
pub mod utils;

pub use config::Config;
pub use error::{TrackerError, TrackerResult};
pub use tracker::Tracker;
