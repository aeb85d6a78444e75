//! Built-in graph store implementations

pub mod memory;

pub use memory::MemoryGraphStore;
