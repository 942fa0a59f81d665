//! Session persistence with owner-only file permissions.
//!
//! The session is written as JSON to
//! `$XDG_CONFIG_HOME/bookfetch/session.json` (or `~/.config/bookfetch/…`,
//! or `%APPDATA%\bookfetch\…`). Writes go to a temporary sibling file that is
//! renamed into place, so a crash never leaves a truncated session file.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{debug, instrument};

use super::session::Session;

const APP_DIR_NAME: &str = "bookfetch";
const SESSION_FILE_NAME: &str = "session.json";

/// Errors for session file operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No suitable user config directory is available.
    #[error("unable to determine config directory (set XDG_CONFIG_HOME or HOME)")]
    ConfigDirUnavailable,
    /// Filesystem I/O failed.
    #[error("session file {path}: {source}")]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The session file is not valid JSON for a session.
    #[error("session file {path} is corrupt: {source}")]
    Json {
        /// The file that failed to parse.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads and writes one session file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// A store backed by an explicit file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A store at the per-user default location.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ConfigDirUnavailable`] if no config dir can be resolved.
    pub fn default_location() -> Result<Self, StorageError> {
        Ok(Self::new(default_config_dir()?.join(SESSION_FILE_NAME)))
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the session, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the directory or file cannot be written.
    #[instrument(level = "debug", skip(self, session), fields(path = %self.path.display()))]
    pub fn save(&self, session: &Session) -> Result<(), StorageError> {
        let payload = serde_json::to_vec_pretty(session).map_err(|source| StorageError::Json {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
            set_owner_only_dir_permissions(parent)?;
        }

        let temp_path = temp_sibling(&self.path);
        let written = write_owner_only(&temp_path, &payload)
            .and_then(|()| fs::rename(&temp_path, &self.path).map_err(|e| StorageError::io(&self.path, e)));
        if written.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        written?;

        debug!("session saved");
        Ok(())
    }

    /// Reads the stored session, if there is one.
    ///
    /// Validity is not checked here.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the file exists but cannot be read or parsed.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<Option<Session>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        let session = serde_json::from_slice(&bytes).map_err(|source| StorageError::Json {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(session))
    }

    /// Deletes the session file. Returns `true` if a file was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when removal fails for a reason other than absence.
    pub fn clear(&self) -> Result<bool, StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(&self.path, e)),
        }
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| SESSION_FILE_NAME.into(), |n| n.to_string_lossy().into_owned());
    let suffix: u32 = rand::thread_rng().r#gen();
    path.with_file_name(format!(".{name}.{suffix:08x}.tmp"))
}

fn write_owner_only(path: &Path, payload: &[u8]) -> Result<(), StorageError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| StorageError::io(path, e))?;
    file.write_all(payload)
        .and_then(|()| file.sync_all())
        .map_err(|e| StorageError::io(path, e))?;
    set_owner_only_permissions(path)
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| StorageError::io(path, e))
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_dir_permissions(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;

    let Some(dir_name) = path.file_name() else {
        return Ok(());
    };
    // Only tighten our own directory, never a shared parent like ~/.config.
    if dir_name != APP_DIR_NAME {
        return Ok(());
    }
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
        .map_err(|e| StorageError::io(path, e))
}

#[cfg(not(unix))]
fn set_owner_only_dir_permissions(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

fn default_config_dir() -> Result<PathBuf, StorageError> {
    resolve_config_dir(
        sanitize_env_path(env::var_os("XDG_CONFIG_HOME")),
        sanitize_env_path(env::var_os("HOME")),
        sanitize_env_path(env::var_os("APPDATA")),
    )
}

fn sanitize_env_path(value: Option<OsString>) -> Option<PathBuf> {
    let value = value?;
    if value.to_string_lossy().trim().is_empty() {
        return None;
    }

    Some(PathBuf::from(value))
}

fn resolve_config_dir(
    xdg_config_home: Option<PathBuf>,
    home: Option<PathBuf>,
    app_data: Option<PathBuf>,
) -> Result<PathBuf, StorageError> {
    if let Some(xdg) = xdg_config_home {
        return Ok(xdg.join(APP_DIR_NAME));
    }
    if let Some(home) = home {
        return Ok(home.join(".config").join(APP_DIR_NAME));
    }
    if let Some(app_data) = app_data {
        return Ok(app_data.join(APP_DIR_NAME));
    }

    Err(StorageError::ConfigDirUnavailable)
}
