// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-session client configuration: which server to talk to and as whom.
//
// Server precedence:
//   global override → SPOOLWIRE_SERVER → <user config>/client.conf
//   → <server config>/client.conf → localhost:631
// User precedence:
//   global override → `User` from client.conf → USER / LOGNAME → uid-<n>
//
// An elevated process skips the environment and the per-user file.

use std::path::Path;

use tracing::{debug, warn};

use spoolwire_core::config::{CLIENT_CONF, ClientConfig, split_server};

use crate::dirs::{Directories, Environment};

/// Server override variable, `host[:port]`.
pub const ENV_SERVER: &str = "SPOOLWIRE_SERVER";

/// Process-wide overrides copied out of the global state.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server: Option<String>,
    pub user: Option<String>,
}

/// Resolve the configuration a new session runs with.
pub fn resolve<E: Environment + ?Sized>(
    env: &E,
    dirs: &Directories,
    overrides: &Overrides,
) -> ClientConfig {
    let elevated = env.is_elevated();

    let mut files = Vec::with_capacity(2);
    if !elevated {
        files.push(dirs.user_config.join(CLIENT_CONF));
    }
    files.push(dirs.server_config.join(CLIENT_CONF));
    let from_file = files.iter().find_map(|path| read_client_conf(path));

    let mut config = from_file.clone().unwrap_or_default();

    let server = overrides
        .server
        .clone()
        .or_else(|| (!elevated).then(|| env.var(ENV_SERVER)).flatten());
    if let Some(server) = server {
        let (host, port) = split_server(&server);
        config.server = host;
        config.port = port;
    }

    config.user = Some(resolve_user(env, from_file.and_then(|c| c.user), overrides));
    debug!(
        server = %config.server,
        port = config.port,
        user = config.user.as_deref().unwrap_or(""),
        "resolved client configuration"
    );
    config
}

fn resolve_user<E: Environment + ?Sized>(
    env: &E,
    configured: Option<String>,
    overrides: &Overrides,
) -> String {
    if let Some(user) = overrides.user.clone().or(configured) {
        return user;
    }
    if !env.is_elevated()
        && let Some(user) = env.var("USER").or_else(|| env.var("LOGNAME"))
    {
        return user;
    }
    format!("uid-{}", env.real_uid())
}

fn read_client_conf(path: &Path) -> Option<ClientConfig> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let parsed = ClientConfig::parse(&text);
            debug!(path = %path.display(), applied = parsed.is_some(), "read client.conf");
            parsed
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read client.conf");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::dirs::tests::FakeEnv;

    fn dirs_in(root: &Path) -> Directories {
        Directories {
            data: root.join("share"),
            server_config: root.join("etc"),
            user_config: root.join("user"),
        }
    }

    fn write_conf(dir: &Path, body: &str) {
        std::fs::create_dir_all(dir).expect("mkdir");
        std::fs::write(dir.join(CLIENT_CONF), body).expect("write");
    }

    #[test]
    fn defaults_when_nothing_configured() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let env = FakeEnv::new().set("USER", "carol");
        let config = resolve(&env, &dirs_in(tmp.path()), &Overrides::default());
        assert_eq!(config.server, "localhost");
        assert_eq!(config.port, 631);
        assert_eq!(config.user.as_deref(), Some("carol"));
    }

    #[test]
    fn user_file_beats_system_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dirs = dirs_in(tmp.path());
        write_conf(&dirs.server_config, "ServerName system.lan\n");
        write_conf(&dirs.user_config, "ServerName mine.lan:8631\nUser dave\n");

        let config = resolve(&FakeEnv::new(), &dirs, &Overrides::default());
        assert_eq!(config.server, "mine.lan");
        assert_eq!(config.port, 8631);
        assert_eq!(config.user.as_deref(), Some("dave"));
    }

    #[test]
    fn environment_beats_files_and_override_beats_environment() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dirs = dirs_in(tmp.path());
        write_conf(&dirs.user_config, "ServerName mine.lan\n");
        let env = FakeEnv::new().set(ENV_SERVER, "env.lan:9000");

        let config = resolve(&env, &dirs, &Overrides::default());
        assert_eq!((config.server.as_str(), config.port), ("env.lan", 9000));

        let overrides = Overrides {
            server: Some("forced.lan".into()),
            user: Some("erin".into()),
        };
        let config = resolve(&env, &dirs, &overrides);
        assert_eq!((config.server.as_str(), config.port), ("forced.lan", 631));
        assert_eq!(config.user.as_deref(), Some("erin"));
    }

    #[test]
    fn elevated_process_ignores_environment_and_user_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dirs = dirs_in(tmp.path());
        write_conf(&dirs.user_config, "ServerName attacker.lan\nUser root\n");
        write_conf(&dirs.server_config, "ServerName system.lan\n");
        let env = FakeEnv::new()
            .elevated()
            .set(ENV_SERVER, "attacker.lan")
            .set("USER", "root");

        let config = resolve(&env, &dirs, &Overrides::default());
        assert_eq!(config.server, "system.lan");
        assert_eq!(config.user.as_deref(), Some("uid-1000"));
    }

    #[test]
    fn missing_user_falls_back_to_uid() {
        let env = FakeEnv::new();
        let dirs = dirs_in(&PathBuf::from("/nonexistent/spoolwire-test"));
        let config = resolve(&env, &dirs, &Overrides::default());
        assert_eq!(config.user.as_deref(), Some("uid-1000"));
    }
}
