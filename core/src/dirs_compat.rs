use std::path::PathBuf;

/// Per-user application data directory, without pulling in a platform-dirs crate.
pub fn data_dir() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        return env_dir("APPDATA");
    }

    if let Some(dir) = env_dir("XDG_DATA_HOME") {
        return Some(dir);
    }

    let home = env_dir("HOME")?;
    if cfg!(target_os = "macos") {
        Some(home.join("Library").join("Application Support"))
    } else {
        Some(home.join(".local").join("share"))
    }
}

fn env_dir(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_variables_are_ignored() {
        assert!(env_dir("MULTIPOST_TEST_UNSET_DIR_VARIABLE").is_none());
    }
}
