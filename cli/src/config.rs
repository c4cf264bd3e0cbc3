use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "ritual").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("ritual.db");

        Ok(Config { db_path, data_dir })
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run).
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        eprintln!("Generated new API key: {key}");
        eprintln!("Include in requests: Authorization: Bearer {key}");
        Ok((key, true))
    }

    // --- Remote server settings ---
    //
    // One value per file in the data directory, same as the api_key file.

    #[must_use]
    pub fn remote_url(&self) -> Option<String> {
        read_setting(&self.data_dir.join("remote_url"))
    }

    #[must_use]
    pub fn remote_key(&self) -> Option<String> {
        read_setting(&self.data_dir.join("remote_key"))
    }

    pub fn set_remote(&self, url: &str, key: Option<&str>) -> Result<()> {
        std::fs::write(self.data_dir.join("remote_url"), url.trim())
            .context("Failed to write remote_url file")?;
        let key_path = self.data_dir.join("remote_key");
        match key {
            Some(key) => {
                std::fs::write(&key_path, key.trim()).context("Failed to write remote_key file")?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))
                        .context("Failed to set remote_key file permissions")?;
                }
            }
            None => {
                if key_path.exists() {
                    std::fs::remove_file(&key_path).context("Failed to remove remote_key file")?;
                }
            }
        }
        Ok(())
    }

    pub fn clear_remote(&self) -> Result<bool> {
        let mut removed = false;
        for name in ["remote_url", "remote_key"] {
            let path = self.data_dir.join(name);
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {name} file"))?;
                removed = true;
            }
        }
        Ok(removed)
    }
}

fn read_setting(path: &std::path::Path) -> Option<String> {
    let value = std::fs::read_to_string(path).ok()?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
