// # Settings Store Implementations
//
// Implementations of the SettingsStore trait for the persistence
// strategies the daemon supports.

pub mod file;
pub mod memory;

pub use file::FileSettingsStore;
pub use memory::MemorySettingsStore;
