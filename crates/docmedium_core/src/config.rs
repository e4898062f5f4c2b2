//! Medium configuration.
//!
//! Everything the medium would otherwise read from process-wide settings
//! is injected through [`Config`].

use std::path::PathBuf;

/// Which locking mechanisms are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockingPolicy {
    /// Hold an OS-level exclusive lock on the original file while editing.
    pub use_system_file_locking: bool,
    /// Write and honour `.~lock.<name>#` records next to documents.
    pub use_legacy_lock_file: bool,
    /// Master switch for the whole lock protocol.
    pub locking_enabled: bool,
}

impl Default for LockingPolicy {
    fn default() -> Self {
        Self {
            use_system_file_locking: true,
            use_legacy_lock_file: true,
            locking_enabled: true,
        }
    }
}

impl LockingPolicy {
    /// Disables every locking mechanism.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            use_system_file_locking: false,
            use_legacy_lock_file: false,
            locking_enabled: false,
        }
    }
}

/// Who this installation is, as written into lock-file records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LockIdentity {
    /// Display name configured in the application.
    pub app_user_name: String,
    /// Operating-system login name.
    pub sys_user_name: String,
    /// Host name.
    pub host: String,
    /// Identifies the user profile (installation).
    pub user_url: String,
}

impl LockIdentity {
    /// Builds an identity from the environment.
    ///
    /// Reads `USER`/`USERNAME`, `HOSTNAME`/`COMPUTERNAME` (falling back to
    /// `/etc/hostname`) and the user configuration directory.
    #[must_use]
    pub fn from_environment() -> Self {
        let sys_user_name = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_default();
        let host = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .ok()
            .or_else(|| {
                std::fs::read_to_string("/etc/hostname")
                    .ok()
                    .map(|h| h.trim().to_string())
            })
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        let user_url = dirs::config_dir()
            .map(|dir| format!("file://{}", dir.join("docmedium").display()))
            .unwrap_or_default();
        Self {
            app_user_name: sys_user_name.clone(),
            sys_user_name,
            host,
            user_url,
        }
    }

    /// Creates an identity from explicit values.
    #[must_use]
    pub fn new(app_user_name: &str, sys_user_name: &str, host: &str, user_url: &str) -> Self {
        Self {
            app_user_name: app_user_name.to_string(),
            sys_user_name: sys_user_name.to_string(),
            host: host.to_string(),
            user_url: user_url.to_string(),
        }
    }
}

/// Configuration shared by all media created from one context.
#[derive(Debug, Clone)]
pub struct Config {
    /// Locking mechanisms.
    pub locking: LockingPolicy,

    /// Sandboxed builds only lock remote documents.
    pub sandboxed: bool,

    /// Non-`file` schemes the lock protocol applies to.
    pub remote_lock_schemes: Vec<String>,

    /// Whether lock conflicts may be shown to the user.
    pub lock_interaction_allowed: bool,

    /// Directory for backups; `None` disables the explicit `.bak` backup.
    pub backup_dir: Option<PathBuf>,

    /// Directory for temp files; `None` uses the system temp dir.
    pub temp_dir: Option<PathBuf>,

    /// Chunk size when staging a stream into a temp file.
    pub copy_buffer_size: usize,

    /// Chunk size when copying into a caller-supplied output stream.
    pub transfer_chunk_size: usize,

    /// Identity written into lock files.
    pub identity: LockIdentity,

    /// Keep base URLs when saving to the local file system.
    pub save_relative_fs: bool,

    /// Keep base URLs when saving to remote locations.
    pub save_relative_inet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locking: LockingPolicy::default(),
            sandboxed: false,
            remote_lock_schemes: vec!["sftp".to_string()],
            lock_interaction_allowed: true,
            backup_dir: dirs::data_local_dir().map(|d| d.join("docmedium").join("backup")),
            temp_dir: None,
            copy_buffer_size: 8192,
            transfer_chunk_size: 32767,
            identity: LockIdentity::from_environment(),
            save_relative_fs: true,
            save_relative_inet: false,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the locking policy.
    #[must_use]
    pub const fn locking(mut self, policy: LockingPolicy) -> Self {
        self.locking = policy;
        self
    }

    /// Sets whether this is a sandboxed build.
    #[must_use]
    pub const fn sandboxed(mut self, value: bool) -> Self {
        self.sandboxed = value;
        self
    }

    /// Sets whether lock conflicts may be shown to the user.
    #[must_use]
    pub const fn lock_interaction_allowed(mut self, value: bool) -> Self {
        self.lock_interaction_allowed = value;
        self
    }

    /// Sets the backup directory.
    #[must_use]
    pub fn backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    /// Sets the temp directory.
    #[must_use]
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Sets the lock identity.
    #[must_use]
    pub fn identity(mut self, identity: LockIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the staging chunk size.
    #[must_use]
    pub const fn copy_buffer_size(mut self, size: usize) -> Self {
        self.copy_buffer_size = size;
        self
    }

    /// Returns true if the lock protocol applies to URLs of `scheme`.
    #[must_use]
    pub fn is_lock_suitable_scheme(&self, scheme: &str) -> bool {
        let remote = self.remote_lock_schemes.iter().any(|s| s == scheme);
        if self.sandboxed {
            remote
        } else {
            scheme == "file" || remote
        }
    }
}
