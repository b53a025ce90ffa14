// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client configuration (`client.conf`).

use tracing::debug;

/// IANA port for IPP.
pub const DEFAULT_PORT: u16 = 631;

/// Host used when nothing else names a server.
pub const DEFAULT_SERVER: &str = "localhost";

/// Name of the per-user and system-wide client configuration file.
pub const CLIENT_CONF: &str = "client.conf";

/// Where the client sends requests and who it says it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Spooler host name or address.
    pub server: String,
    /// Spooler port (default 631).
    pub port: u16,
    /// Requesting user name, when configured explicitly.
    pub user: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            port: DEFAULT_PORT,
            user: None,
        }
    }
}

impl ClientConfig {
    /// Parse a `client.conf` body.
    ///
    /// Recognises `ServerName host[:port]` and `User name`, case-insensitive on
    /// the directive. Blank lines and `#` comments are skipped; anything else
    /// is ignored. Returns `None` when no directive applied, so callers can
    /// keep looking further down the precedence chain.
    pub fn parse(text: &str) -> Option<Self> {
        let mut config = Self::default();
        let mut applied = false;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (directive, value) = match line.split_once(char::is_whitespace) {
                Some((d, v)) => (d, v.trim()),
                None => (line, ""),
            };
            if value.is_empty() {
                continue;
            }

            if directive.eq_ignore_ascii_case("ServerName") {
                let (server, port) = split_server(value);
                config.server = server;
                config.port = port;
                applied = true;
            } else if directive.eq_ignore_ascii_case("User") {
                config.user = Some(value.to_string());
                applied = true;
            } else {
                debug!(directive, "ignoring unknown client.conf directive");
            }
        }

        applied.then_some(config)
    }

    /// `host:port` as used in the HTTP `Host` header.
    /// `host:port`, with IPv6 literals bracketed for use in a URI.
    pub fn authority(&self) -> String {
        if self.server.contains(':') {
            format!("[{}]:{}", self.server, self.port)
        } else {
            format!("{}:{}", self.server, self.port)
        }
    }
}

/// Split `host[:port]`, leaving bracketed IPv6 literals intact.
pub fn split_server(value: &str) -> (String, u16) {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix('[')
        && let Some((host, tail)) = rest.split_once(']')
    {
        let port = tail
            .strip_prefix(':')
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        return (host.to_string(), port);
    }
    match value.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (value.to_string(), DEFAULT_PORT),
        },
        _ => (value.to_string(), DEFAULT_PORT),
    }
}
