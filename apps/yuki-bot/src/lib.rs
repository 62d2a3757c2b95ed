pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod messages;
pub mod models;
pub mod query;
pub mod service;
pub mod sessions;

pub use driver::{Driver, DriverState, SessionOutcome, SweepReport};
pub use service::{ServerEvent, SessionDescriptor, SessionService};
