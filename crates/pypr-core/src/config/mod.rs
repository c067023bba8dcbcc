mod loader;
pub mod schema;
mod view;

pub use loader::{load_config, merge};
pub use schema::{ConfigField, FieldType, Schema, Validator, find_similar_key};
pub use view::{BOOL_FALSE_STRINGS, BOOL_TRUE_STRINGS, BOOL_STRINGS, ConfigView, coerce_to_bool};
