// Kernel services reachable through system calls
pub mod file_system_service;

pub use file_system_service::{FileSystemService, OpenFlags};
