//! Utility modules for filesystem, path, mode, and privilege operations.

pub mod fs;
pub mod mode;
pub mod path;
pub mod privilege;
