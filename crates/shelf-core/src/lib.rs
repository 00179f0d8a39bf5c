pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod hasher;
pub mod probe;
pub mod progress;
pub mod scanner;
pub mod storage;
pub mod tagger;

pub use config::AppConfig;
pub use engine::{PassReport, ScanEngine};
pub use error::Error;
pub use progress::{ProgressReporter, SilentReporter};
pub use tagger::AutoTagger;
