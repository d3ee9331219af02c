use crate::discovery::paths::Scope;
use std::{io, path::PathBuf};
use winreg::{
    enums::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE},
    RegKey,
};

/// Read the manifest location a browser would find under `key_path`.
///
/// Returns `Ok(None)` when the key does not exist.
pub fn read_manifest_path_from_reg(scope: Scope, key_path: &str) -> io::Result<Option<PathBuf>> {
    let root = match scope {
        Scope::User => RegKey::predef(HKEY_CURRENT_USER),
        Scope::System => RegKey::predef(HKEY_LOCAL_MACHINE),
    };
    let key = match root.open_subkey(key_path) {
        Ok(key) => key,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let value: String = key.get_value("")?;
    Ok(Some(PathBuf::from(value)))
}
