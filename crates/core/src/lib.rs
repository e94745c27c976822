pub mod config;
pub mod e2e;
pub mod error;
pub mod issue;
pub mod job;
pub mod log;

pub use config::Config;
pub use e2e::*;
pub use error::*;
pub use issue::*;
pub use job::*;
pub use log::*;
