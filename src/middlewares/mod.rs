pub mod logger;

pub use logger::RequestLogger;
