//! Configuration and CLI (spec §1 "out of scope: ... configuration file
//! parsing"; SPEC_FULL §A.4).
//!
//! Node settings load from a TOML file via `serde`/`toml`; `clap` flags let
//! the operator override the config path and a handful of settings without
//! editing the file, mirroring the teacher's `#[derive(Parser)]` enum-of-
//! subcommands style in `main.rs` (there: `Create`/`Join`; here: `run`/
//! `fingers`).

use crate::error::StartupError;
use serde::Deserialize;
use std::net::Ipv6Addr;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct NodeConfig {
    /// Address the overlay UDP socket binds to.
    #[serde(default = "default_bind_addr")]
    pub overlay_addr: Ipv6Addr,
    /// Overlay port; the bulk-transfer sibling uses `overlay_port + 1`
    /// (spec §4.4, "port convention").
    pub overlay_port: u16,
    /// Address/port the local control TCP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub control_addr: Ipv6Addr,
    pub control_port: u16,
    /// Directory holding stored files (spec §6 "Filesystem layout").
    pub files_path: PathBuf,
    /// Ticket replay window in seconds (spec §4.1 design default 60).
    #[serde(default = "default_ticket_timeout")]
    pub ticket_timeout_secs: u64,
}

fn default_bind_addr() -> Ipv6Addr {
    Ipv6Addr::UNSPECIFIED
}

fn default_ticket_timeout() -> u64 {
    crate::ticket::TICKET_TIMEOUT
}

impl NodeConfig {
    pub async fn load(path: &std::path::Path) -> Result<NodeConfig, StartupError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|source| StartupError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        let config: NodeConfig = toml::from_str(&text)?;
        if !config.files_path.is_dir() {
            return Err(StartupError::StorageRoot { path: config.files_path.display().to_string() });
        }
        Ok(config)
    }
}

/// The node binary's command-line surface.
#[derive(clap::Parser)]
#[command(name = "dhash-node")]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "dhash-node.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Run the node: join the overlay, serve the control socket.
    Run {
        /// Override the overlay bind port from the config file.
        #[arg(long)]
        overlay_port: Option<u16>,
        /// Override the control bind port from the config file.
        #[arg(long)]
        control_port: Option<u16>,
    },
    /// Connect to a running node's control socket and print whatever
    /// routing-table snapshot it exposes (spec §1, the diagnostic CLI is an
    /// external collaborator; this is the minimal stub SPEC_FULL §A.6
    /// describes).
    Fingers {
        /// Control-socket address of the node to query.
        #[arg(long)]
        control_addr: String,
    },
}

impl NodeConfig {
    pub fn with_run_overrides(mut self, overlay_port: Option<u16>, control_port: Option<u16>) -> Self {
        if let Some(p) = overlay_port {
            self.overlay_port = p;
        }
        if let Some(p) = control_port {
            self.control_port = p;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_rejects_missing_storage_root() {
        let mut dir = std::env::temp_dir();
        dir.push(format!("dhash-node-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let config_path = dir.join("node.toml");
        std::fs::write(
            &config_path,
            format!(
                "overlay_port = 9000\ncontrol_port = 9100\nfiles_path = \"{}\"\n",
                dir.join("nonexistent").display()
            ),
        )
        .unwrap();
        let result = NodeConfig::load(&config_path).await;
        assert!(matches!(result, Err(StartupError::StorageRoot { .. })));
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn load_succeeds_with_valid_storage_root() {
        let mut dir = std::env::temp_dir();
        dir.push(format!("dhash-node-config-test-ok-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let files_path = dir.join("files");
        std::fs::create_dir_all(&files_path).unwrap();
        let config_path = dir.join("node.toml");
        std::fs::write(
            &config_path,
            format!("overlay_port = 9000\ncontrol_port = 9100\nfiles_path = \"{}\"\n", files_path.display()),
        )
        .unwrap();
        let config = NodeConfig::load(&config_path).await.unwrap();
        assert_eq!(config.overlay_port, 9000);
        assert_eq!(config.ticket_timeout_secs, crate::ticket::TICKET_TIMEOUT);
        std::fs::remove_dir_all(dir).ok();
    }
}
