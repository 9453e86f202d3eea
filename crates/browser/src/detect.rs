//! Browser executable detection and install guidance.

use std::path::PathBuf;

/// Chromium-based executable names searched on `PATH`. All speak CDP.
const CHROMIUM_EXECUTABLES: &[&str] = &[
    "chrome",
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "msedge",
    "microsoft-edge",
    "brave-browser",
];

#[cfg(target_os = "macos")]
const MACOS_APP_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
];

#[cfg(target_os = "windows")]
const WINDOWS_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
];

/// Locate a Chromium-based browser.
///
/// Order: the configured path, the `CHROME` environment variable, the
/// platform install locations, then `PATH`.
pub fn find_browser(custom_path: Option<&str>) -> Option<PathBuf> {
    let candidates = custom_path
        .map(PathBuf::from)
        .into_iter()
        .chain(std::env::var("CHROME").ok().map(PathBuf::from));

    for p in candidates {
        if p.exists() {
            return Some(p);
        }
    }

    #[cfg(target_os = "macos")]
    if let Some(p) = MACOS_APP_PATHS.iter().map(PathBuf::from).find(|p| p.exists()) {
        return Some(p);
    }

    #[cfg(target_os = "windows")]
    if let Some(p) = WINDOWS_PATHS.iter().map(PathBuf::from).find(|p| p.exists()) {
        return Some(p);
    }

    CHROMIUM_EXECUTABLES
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// Platform-specific hint appended to launch failures.
pub fn install_instructions() -> String {
    let instructions = if cfg!(target_os = "macos") {
        "  brew install --cask google-chrome"
    } else if cfg!(target_os = "linux") {
        "  Debian/Ubuntu: sudo apt install chromium-browser\n  \
         Fedora:         sudo dnf install chromium\n  \
         Arch:           sudo pacman -S chromium"
    } else if cfg!(target_os = "windows") {
        "  winget install Google.Chrome"
    } else {
        "  Download from https://www.google.com/chrome/"
    };

    format!(
        "No Chromium-based browser found. Install one:\n\n\
         {instructions}\n\n\
         Or set `chrome_path` under [launch] in pageplus.toml, \
         or the CHROME environment variable."
    )
}
