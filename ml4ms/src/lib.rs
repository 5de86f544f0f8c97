pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod interrupt;
pub mod merge;
pub mod overlay;
pub mod schema;
pub mod store;
pub mod validation;

pub use config::{DatabaseConfig, RunControl};
pub use document::{Collection, Document, Value};
pub use error::{Ml4msError, Result};
pub use schema::SchemaSet;
pub use store::Store;
