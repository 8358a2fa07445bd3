pub mod config;
pub mod error;
pub mod series;
pub mod workflow;

pub use config::Config;
pub use error::*;
pub use series::*;
pub use workflow::*;
