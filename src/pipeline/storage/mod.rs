// Shared table storage for pipeline runs

pub mod in_memory;

pub use in_memory::TableStore;
