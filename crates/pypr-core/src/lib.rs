pub mod backend;
pub mod config;
pub mod paths;
pub mod state;
pub mod units;
pub mod variables;

mod error;

pub use error::{Error, Result};
pub use state::{SharedState, SharedStateRef};

pub use pypr_types::*;
