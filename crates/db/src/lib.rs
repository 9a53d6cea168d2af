pub mod models;
pub mod persistable;
pub mod service;

pub use persistable::{ModelType, Persistable};
pub use service::{DbService, DbWriter};
