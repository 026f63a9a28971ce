pub mod config;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod flows;
pub mod origin;
pub mod prediction;
pub mod ratelimit;
pub mod server;
pub mod stream;

pub use error::{Error, ErrorKind, Result};
