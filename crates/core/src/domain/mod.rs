pub mod allocation;
pub mod instruments;
pub mod policy;
