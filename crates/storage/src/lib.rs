pub mod assets;
pub mod error;
pub mod ignore;
pub mod library;
mod manager;
mod models;
mod path;
pub mod strategy;
mod tree;
pub mod upload;

pub use crate::library::LibraryDefinition;
pub use crate::manager::StorageManager;
pub use crate::models::{CONTENT_DESCRIPTOR, ContentId};
pub use crate::path::{PathResolver, validate as validate_path, validate_segment};
pub use crate::strategy::{FileSystemStrategy, StorageStrategy};
pub use crate::tree::TreeOps;
use std::sync::Arc;

pub type StrategyHandle = Arc<dyn StorageStrategy + Send + Sync>;
