pub mod loader;
pub mod memory;
pub mod provider;
pub mod returns;
pub mod types;
