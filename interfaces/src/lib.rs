pub mod defs;

pub use defs::{Article, Provider, NEW_PROVIDER_TOPIC};
