pub mod config;
pub mod cron_expr;
pub mod error;
pub mod resources;

pub use config::Config;
pub use error::*;
pub use resources::*;
