//! File system storage management
//!
//! Handles the instance data directory, path validation inside home
//! directories, and the file operations behind transfer commands.

pub mod instance;
pub mod operations;
pub mod validation;

pub use instance::prepare_instance_dir;
pub use validation::{ResolvedPath, resolve_in_jail, resolve_virtual_path};
