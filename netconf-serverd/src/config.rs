use crate::cli::Cli;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub host_key: PathBuf,
    pub extra_capabilities: Vec<String>,
}

impl From<&Cli> for ServerConfig {
    fn from(cli: &Cli) -> Self {
        ServerConfig {
            bind: cli.bind,
            host_key: cli.host_key.clone(),
            extra_capabilities: cli.capability.clone(),
        }
    }
}
