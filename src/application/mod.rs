// Application layer - use cases and orchestration.
// Every mutation runs as one unit of work against the repository; business
// failures come back as `LedgerError`, and `Outcome` is what callers see.

pub mod config;
pub mod error;
pub mod outcome;
pub mod service;

pub use config::*;
pub use error::*;
pub use outcome::*;
pub use service::*;
