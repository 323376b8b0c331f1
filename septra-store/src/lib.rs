pub mod app_config;
pub mod directory;
pub mod events;
pub mod json_file;
pub mod memory;

pub use directory::StaticSupplierDirectory;
pub use events::{BroadcastNotifier, InboxNotifier, TracingNotifier};
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
