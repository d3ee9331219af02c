//! Locating the native host the way a browser does: per-browser manifest
//! directories, manifest parsing and (on Windows) registry pointers.

pub mod manifest;
pub mod paths;

#[cfg(all(windows, feature = "windows-registry"))]
pub mod winreg;

pub use manifest::*;
pub use paths::*;
