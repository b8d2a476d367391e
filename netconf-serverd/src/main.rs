use clap::Parser;
use cli::Cli;
use config::ServerConfig;
use env_logger::{Builder, Env, Target};
use netconf_server::memstore::MemDatastore;
use netconf_server::server::Server;
use netconf_server::stream::BroadcastStreamService;
use netconf_server::transport::ssh::SshTransport;
use std::env;
use std::sync::Arc;

mod cli;
mod config;

fn init_logging() {
    let env = Env::default().filter_or("NETCONF_LOG", "info");
    let mut builder = Builder::new();
    builder.target(Target::Stdout);
    builder.parse_env(env);
    builder.init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.debug {
        env::set_var("NETCONF_LOG", "debug");
    }
    if cli.trace {
        env::set_var("NETCONF_LOG", "trace");
    }
    init_logging();

    let config = ServerConfig::from(&cli);
    let datastore = Arc::new(MemDatastore::new());
    let stream_service = Arc::new(BroadcastStreamService::new());
    let server = Server::new(datastore, stream_service, config.extra_capabilities);

    log::info!("binding ssh transport on {}", config.bind);
    let transport = SshTransport::bind(config.bind, &config.host_key).await?;

    tokio::select! {
        result = server.serve(Box::new(transport)) => {
            if let Err(err) = result {
                log::error!("server loop exited: {err}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutting down on ctrl-c");
        }
    }

    Ok(())
}
