mod dirs;
mod settings;
mod validation;

pub use dirs::Layout;
pub use settings::{Config, Timings};
pub use validation::warn_unknown_fields;
