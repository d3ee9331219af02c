use std::io;
use std::path::PathBuf;

/// Browsers whose manifest locations we know.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Browser {
    Chrome,
    Chromium,
    Edge,
    Firefox,
}

/// Where a manifest is installed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Current user's profile.
    User,
    /// Machine-wide.
    System,
}

impl Browser {
    pub const ALL: [Browser; 4] = [
        Browser::Chrome,
        Browser::Chromium,
        Browser::Edge,
        Browser::Firefox,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Browser::Chrome => "chrome",
            Browser::Chromium => "chromium",
            Browser::Edge => "edge",
            Browser::Firefox => "firefox",
        }
    }

    /// Firefox-family manifests list `allowed_extensions`; Chromium-family list
    /// `allowed_origins`.
    pub fn is_firefox_family(self) -> bool {
        matches!(self, Browser::Firefox)
    }

    /// Registry key (under HKCU or HKLM) whose default value points at the manifest.
    pub fn winreg_key_path(self, name: &str) -> String {
        match self {
            Browser::Chrome => format!(r"Software\Google\Chrome\NativeMessagingHosts\{name}"),
            Browser::Chromium => format!(r"Software\Chromium\NativeMessagingHosts\{name}"),
            Browser::Edge => format!(r"Software\Microsoft\Edge\NativeMessagingHosts\{name}"),
            Browser::Firefox => format!(r"Software\Mozilla\NativeMessagingHosts\{name}"),
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn unix_home_dir() -> io::Result<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))
}

/// Directory a browser searches for manifests in the given scope.
#[cfg(target_os = "linux")]
pub fn manifest_dir(browser: Browser, scope: Scope) -> io::Result<PathBuf> {
    Ok(match (browser, scope) {
        (Browser::Chrome, Scope::User) => unix_home_dir()?.join(".config/google-chrome/NativeMessagingHosts"),
        (Browser::Chromium, Scope::User) => unix_home_dir()?.join(".config/chromium/NativeMessagingHosts"),
        (Browser::Edge, Scope::User) => unix_home_dir()?.join(".config/microsoft-edge/NativeMessagingHosts"),
        (Browser::Firefox, Scope::User) => unix_home_dir()?.join(".mozilla/native-messaging-hosts"),
        (Browser::Chrome, Scope::System) => PathBuf::from("/etc/opt/chrome/native-messaging-hosts"),
        (Browser::Chromium, Scope::System) => PathBuf::from("/etc/chromium/native-messaging-hosts"),
        (Browser::Edge, Scope::System) => PathBuf::from("/etc/opt/edge/native-messaging-hosts"),
        (Browser::Firefox, Scope::System) => PathBuf::from("/usr/lib/mozilla/native-messaging-hosts"),
    })
}

/// Directory a browser searches for manifests in the given scope.
#[cfg(target_os = "macos")]
pub fn manifest_dir(browser: Browser, scope: Scope) -> io::Result<PathBuf> {
    Ok(match (browser, scope) {
        (Browser::Chrome, Scope::User) => unix_home_dir()?.join("Library/Application Support/Google/Chrome/NativeMessagingHosts"),
        (Browser::Chromium, Scope::User) => unix_home_dir()?.join("Library/Application Support/Chromium/NativeMessagingHosts"),
        (Browser::Edge, Scope::User) => unix_home_dir()?.join("Library/Application Support/Microsoft Edge/NativeMessagingHosts"),
        (Browser::Firefox, Scope::User) => unix_home_dir()?.join("Library/Application Support/Mozilla/NativeMessagingHosts"),
        (Browser::Chrome, Scope::System) => PathBuf::from("/Library/Google/Chrome/NativeMessagingHosts"),
        (Browser::Chromium, Scope::System) => PathBuf::from("/Library/Application Support/Chromium/NativeMessagingHosts"),
        (Browser::Edge, Scope::System) => PathBuf::from("/Library/Microsoft/Edge/NativeMessagingHosts"),
        (Browser::Firefox, Scope::System) => PathBuf::from("/Library/Mozilla/NativeMessagingHosts"),
    })
}

/// Conventional manifest directory on Windows. Browsers there locate manifests through
/// the registry, see [`Browser::winreg_key_path`].
#[cfg(target_os = "windows")]
pub fn manifest_dir(browser: Browser, scope: Scope) -> io::Result<PathBuf> {
    let base = match scope {
        Scope::User => std::env::var_os(if browser.is_firefox_family() { "APPDATA" } else { "LOCALAPPDATA" })
            .map(PathBuf::from)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "APPDATA/LOCALAPPDATA not set"))?,
        Scope::System => std::env::var_os("PROGRAMDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData")),
    };
    Ok(if browser.is_firefox_family() {
        base.join(r"Mozilla\NativeMessagingHosts")
    } else {
        base.join("NativeMessagingHosts")
    })
}

/// Full path of the manifest for host `name`.
pub fn manifest_path(browser: Browser, scope: Scope, name: &str) -> io::Result<PathBuf> {
    Ok(manifest_dir(browser, scope)?.join(format!("{name}.json")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_keys_end_with_host_name() {
        for browser in Browser::ALL {
            let key = browser.winreg_key_path("com.example.host");
            assert!(key.starts_with("Software\\"));
            assert!(key.ends_with("NativeMessagingHosts\\com.example.host"));
        }
    }

    #[test]
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    fn system_paths_do_not_depend_on_home() {
        let p = manifest_path(Browser::Firefox, Scope::System, "com.example.host").unwrap();
        assert!(p.is_absolute());
        assert!(p.ends_with("com.example.host.json"));
    }
}
