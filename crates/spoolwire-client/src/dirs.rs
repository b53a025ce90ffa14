// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data and configuration directory resolution.
//
// SECURITY: when the process runs with an effective identity that differs
// from the real one (setuid/setgid), nothing in the environment is trusted.
// Every directory falls back to the compiled-in default so a caller cannot
// point a privileged process at files it controls.
//
// Precedence for each directory:
//   elevated → compiled-in default
//   override variable → that path
//   platform conventions (user config only), first existing wins
//   per-user temporary directory keyed by numeric uid

use std::path::{Path, PathBuf};

use tracing::debug;

/// Override for the shared data directory.
pub const ENV_DATADIR: &str = "SPOOLWIRE_DATADIR";

/// Override for the server (system-wide) configuration directory.
pub const ENV_SERVERROOT: &str = "SPOOLWIRE_SERVERROOT";

/// Override for the per-user configuration directory.
pub const ENV_USERCONFIG: &str = "SPOOLWIRE_USERCONFIG";

/// Compiled-in shared data directory.
pub const DEFAULT_DATA_DIR: &str = match option_env!("SPOOLWIRE_DEFAULT_DATADIR") {
    Some(dir) => dir,
    None => "/usr/share/spoolwire",
};

/// Compiled-in server configuration directory.
pub const DEFAULT_SERVER_ROOT: &str = match option_env!("SPOOLWIRE_DEFAULT_SERVERROOT") {
    Some(dir) => dir,
    None => "/etc/spoolwire",
};

/// Temporary directory used when the environment cannot be trusted.
const TRUSTED_TMP: &str = "/tmp";

/// Directory name under the user's configuration roots.
const APP_DIR: &str = "spoolwire";

/// Legacy dotfile directory under `$HOME` (and the snap-scoped common dir).
const LEGACY_DIR: &str = ".spoolwire";

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Everything directory resolution reads from the outside world.
///
/// [`SystemEnvironment`] is the live implementation; tests supply their own so
/// they never mutate the process environment.
pub trait Environment {
    /// A non-empty environment variable.
    fn var(&self, key: &str) -> Option<String>;

    fn real_uid(&self) -> u32;
    fn effective_uid(&self) -> u32;
    fn real_gid(&self) -> u32;
    fn effective_gid(&self) -> u32;

    /// The user's home directory.
    fn home(&self) -> Option<PathBuf> {
        self.var("HOME").map(PathBuf::from)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn temp_dir(&self) -> PathBuf {
        std::env::temp_dir()
    }

    /// Running setuid or setgid.
    fn is_elevated(&self) -> bool {
        self.real_uid() != self.effective_uid() || self.real_gid() != self.effective_gid()
    }
}

/// The calling process's real environment and identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }

    #[cfg(unix)]
    fn real_uid(&self) -> u32 {
        // SAFETY: getuid() cannot fail and has no preconditions.
        unsafe { libc::getuid() }
    }

    #[cfg(unix)]
    fn effective_uid(&self) -> u32 {
        // SAFETY: geteuid() cannot fail and has no preconditions.
        unsafe { libc::geteuid() }
    }

    #[cfg(unix)]
    fn real_gid(&self) -> u32 {
        // SAFETY: getgid() cannot fail and has no preconditions.
        unsafe { libc::getgid() }
    }

    #[cfg(unix)]
    fn effective_gid(&self) -> u32 {
        // SAFETY: getegid() cannot fail and has no preconditions.
        unsafe { libc::getegid() }
    }

    #[cfg(not(unix))]
    fn real_uid(&self) -> u32 {
        0
    }

    #[cfg(not(unix))]
    fn effective_uid(&self) -> u32 {
        0
    }

    #[cfg(not(unix))]
    fn real_gid(&self) -> u32 {
        0
    }

    #[cfg(not(unix))]
    fn effective_gid(&self) -> u32 {
        0
    }

    fn home(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }
}

// ---------------------------------------------------------------------------
// Platform capability
// ---------------------------------------------------------------------------

/// Where a platform keeps shared data and configuration.
pub trait PlatformDirs {
    fn data_dir(&self) -> PathBuf;
    fn server_config_dir(&self) -> PathBuf;
    fn user_config_dir(&self) -> PathBuf;
}

/// Directory conventions for Unix-like systems.
pub struct UnixDirs<'a, E: Environment + ?Sized> {
    env: &'a E,
}

impl<'a, E: Environment + ?Sized> UnixDirs<'a, E> {
    pub fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// `<tmp>/spoolwire-<uid>`, unique per user even with no home.
    fn per_user_temp(&self, tmp: PathBuf) -> PathBuf {
        tmp.join(format!("{APP_DIR}-{}", self.env.real_uid()))
    }
}

impl<E: Environment + ?Sized> PlatformDirs for UnixDirs<'_, E> {
    fn data_dir(&self) -> PathBuf {
        override_or(self.env, ENV_DATADIR, DEFAULT_DATA_DIR)
    }

    fn server_config_dir(&self) -> PathBuf {
        override_or(self.env, ENV_SERVERROOT, DEFAULT_SERVER_ROOT)
    }

    fn user_config_dir(&self) -> PathBuf {
        if self.env.is_elevated() {
            return self.per_user_temp(PathBuf::from(TRUSTED_TMP));
        }
        if let Some(dir) = self.env.var(ENV_USERCONFIG) {
            return PathBuf::from(dir);
        }

        let home = self.env.home();
        let mut candidates = Vec::with_capacity(4);
        if let Some(snap) = self.env.var("SNAP_USER_COMMON") {
            candidates.push(PathBuf::from(snap).join(LEGACY_DIR));
        }
        if let Some(xdg) = self.env.var("XDG_CONFIG_HOME") {
            candidates.push(PathBuf::from(xdg).join(APP_DIR));
        }
        if let Some(home) = &home {
            candidates.push(home.join(".config").join(APP_DIR));
            candidates.push(home.join(LEGACY_DIR));
        }

        if let Some(found) = candidates.into_iter().find(|c| self.env.exists(c)) {
            return found;
        }

        // Nothing exists yet: the legacy location still gives a later write
        // somewhere to land.
        match home {
            Some(home) => home.join(LEGACY_DIR),
            None => self.per_user_temp(self.env.temp_dir()),
        }
    }
}

/// Directory conventions for Windows.
#[cfg(windows)]
pub struct WindowsDirs<'a, E: Environment + ?Sized> {
    env: &'a E,
}

#[cfg(windows)]
impl<'a, E: Environment + ?Sized> WindowsDirs<'a, E> {
    pub fn new(env: &'a E) -> Self {
        Self { env }
    }

    fn install_root(&self) -> PathBuf {
        self.env
            .var("ProgramFiles")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Program Files"))
            .join(APP_DIR)
    }
}

#[cfg(windows)]
impl<E: Environment + ?Sized> PlatformDirs for WindowsDirs<'_, E> {
    fn data_dir(&self) -> PathBuf {
        match self.env.var(ENV_DATADIR) {
            Some(dir) => PathBuf::from(dir),
            None => self.install_root().join("share"),
        }
    }

    fn server_config_dir(&self) -> PathBuf {
        match self.env.var(ENV_SERVERROOT) {
            Some(dir) => PathBuf::from(dir),
            None => self.install_root().join("conf"),
        }
    }

    fn user_config_dir(&self) -> PathBuf {
        if let Some(dir) = self.env.var(ENV_USERCONFIG) {
            return PathBuf::from(dir);
        }
        match dirs::config_dir() {
            Some(dir) => dir.join(APP_DIR),
            None => self.env.temp_dir().join(format!("{APP_DIR}-{}", self.env.real_uid())),
        }
    }
}

#[cfg(not(windows))]
fn native<E: Environment + ?Sized>(env: &E) -> impl PlatformDirs + '_ {
    UnixDirs::new(env)
}

#[cfg(windows)]
fn native<E: Environment + ?Sized>(env: &E) -> impl PlatformDirs + '_ {
    WindowsDirs::new(env)
}

/// Override variable when trusted, otherwise the compiled-in default.
fn override_or<E: Environment + ?Sized>(env: &E, key: &str, default: &str) -> PathBuf {
    if env.is_elevated() {
        return PathBuf::from(default);
    }
    env.var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

// ---------------------------------------------------------------------------
// Resolved set
// ---------------------------------------------------------------------------

/// The three directories a session uses, computed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directories {
    pub data: PathBuf,
    pub server_config: PathBuf,
    pub user_config: PathBuf,
}

impl Directories {
    /// Resolve with the platform's conventions.
    pub fn resolve<E: Environment + ?Sized>(env: &E) -> Self {
        Self::from_platform(&native(env))
    }

    pub fn from_platform(platform: &impl PlatformDirs) -> Self {
        let dirs = Self {
            data: platform.data_dir(),
            server_config: platform.server_config_dir(),
            user_config: platform.user_config_dir(),
        };
        debug!(
            data = %dirs.data.display(),
            server_config = %dirs.server_config.display(),
            user_config = %dirs.user_config.display(),
            "resolved directories"
        );
        dirs
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
