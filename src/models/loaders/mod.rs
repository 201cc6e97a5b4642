pub mod toml_loader;

pub use toml_loader::{load_cases, load_profile, parse_cases, parse_profile};
