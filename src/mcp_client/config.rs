//! Server configuration loading.
//!
//! Reads an MCP servers file (`.json`, `.yaml` or `.yml`) and resolves
//! environment variables before parsing.

use std::path::Path;

use super::errors::McpError;
use super::types::{McpServersConfig, ServerConfig};

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Load and parse a servers configuration file.
///
/// Performs environment-variable interpolation on the raw text for
/// `${VAR_NAME}` and `${VAR_NAME:-default}`. The format follows the file
/// extension; anything other than `.yaml`/`.yml` is parsed as JSON.
pub fn load_servers_config(path: &Path) -> Result<McpServersConfig, McpError> {
    let raw = std::fs::read_to_string(path).map_err(|e| McpError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let interpolated = interpolate_env_vars(&raw);

    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml")
    );

    let config: McpServersConfig = if is_yaml {
        serde_yaml::from_str(&interpolated).map_err(|e| McpError::ConfigError {
            reason: format!("failed to parse {}: {e}", path.display()),
        })?
    } else {
        serde_json::from_str(&interpolated).map_err(|e| McpError::ConfigError {
            reason: format!("failed to parse {}: {e}", path.display()),
        })?
    };

    for (name, server) in &config.servers {
        if server.command.trim().is_empty() {
            return Err(McpError::ConfigError {
                reason: format!("server '{name}' has an empty command"),
            });
        }
    }

    tracing::debug!(
        path = %path.display(),
        servers = config.servers.len(),
        "loaded MCP servers config"
    );

    Ok(config)
}

impl McpServersConfig {
    /// Look up one server's launch configuration.
    pub fn server(&self, name: &str) -> Result<&ServerConfig, McpError> {
        self.servers.get(name).ok_or(McpError::ConfigError {
            reason: format!("no configuration for server '{name}'"),
        })
    }

    /// Names of all configured servers, sorted.
    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.keys().cloned().collect();
        names.sort();
        names
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Substitute `${VAR}` and `${VAR:-default}` references.
///
/// An unset variable without a default becomes empty. An unterminated `${`
/// is kept as written.
fn interpolate_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let expr = &rest[start + 2..];
        let Some(end) = expr.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        out.push_str(&lookup_var(&expr[..end]));
        rest = &expr[end + 1..];
    }

    out.push_str(rest);
    out
}

fn lookup_var(expr: &str) -> String {
    let (name, default) = match expr.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (expr, None),
    };
    std::env::var(name)
        .ok()
        .or_else(|| default.map(home_relative))
        .unwrap_or_default()
}

/// Resolve `~` or `~/...` against the home directory; anything else is returned as is.
fn home_relative(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return path.to_string(),
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{rest}", home.display()),
        None => path.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
