use std::path::PathBuf;

pub const HOST_TCP_PORT: u16 = 9877;
pub const HTTP_PORT: u16 = 8977;

pub fn data_dir() -> PathBuf {
    // Same XDG-style layout on macOS and Linux
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("scrobbler")
    }
    #[cfg(windows)]
    {
        // Portable install: data/ next to the executable wins
        if let Some(dir) = portable_dir("data") {
            return dir;
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scrobbler")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(dir) = portable_dir("config.toml").and_then(|p| p.parent().map(PathBuf::from)) {
            return dir;
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scrobbler")
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("scrobbler")
    }
}

#[cfg(windows)]
fn portable_dir(name: &str) -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    let candidate = exe_path.parent()?.join(name);
    candidate.exists().then_some(candidate)
}
