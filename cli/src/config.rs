use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub const DEFAULT_USER: &str = "local";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub user: String,
}

impl Config {
    /// Resolve paths and the acting user. `user_flag` wins over
    /// `GROCERIA_USER`, which wins over [`DEFAULT_USER`].
    pub fn load(user_flag: Option<String>) -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "groceria").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = std::env::var_os("GROCERIA_DB")
            .map_or_else(|| data_dir.join("groceria.db"), PathBuf::from);

        let user = resolve_user(user_flag, std::env::var("GROCERIA_USER").ok());

        Ok(Config {
            db_path,
            data_dir,
            user,
        })
    }

    /// Load the API key from disk, or generate a new one.
    pub fn load_or_create_api_key(&self) -> Result<String> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok(key);
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
        Ok(key)
    }
}

fn resolve_user(flag: Option<String>, env: Option<String>) -> String {
    [flag, env]
        .into_iter()
        .flatten()
        .map(|u| u.trim().to_string())
        .find(|u| !u.is_empty())
        .unwrap_or_else(|| DEFAULT_USER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_precedence() {
        assert_eq!(
            resolve_user(Some("alice".to_string()), Some("bob".to_string())),
            "alice"
        );
        assert_eq!(resolve_user(None, Some("bob".to_string())), "bob");
        assert_eq!(resolve_user(None, None), DEFAULT_USER);
    }

    #[test]
    fn test_resolve_user_ignores_blank() {
        assert_eq!(
            resolve_user(Some("  ".to_string()), Some("bob".to_string())),
            "bob"
        );
        assert_eq!(resolve_user(Some(String::new()), None), DEFAULT_USER);
    }

    #[test]
    fn test_api_key_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: dir.path().join("groceria.db"),
            data_dir: dir.path().to_path_buf(),
            user: DEFAULT_USER.to_string(),
        };
        let first = config.load_or_create_api_key().unwrap();
        assert_eq!(first.len(), 64);
        let second = config.load_or_create_api_key().unwrap();
        assert_eq!(first, second);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.path().join("api_key"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
