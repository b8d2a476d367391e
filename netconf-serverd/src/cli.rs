use clap::{crate_authors, crate_description, crate_name, crate_version, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;

const ABOUT: &str = "Standalone NETCONF server daemon\nUse NETCONF_LOG to set log filter and level";

const HELP_TEMPLATE: &str = color_print::cstr!(
    "\
{about-with-newline}
<green,bold>Author:</> {author}

<green,bold>Usage:</> {usage}

<green,bold>Options:</>
{options}"
);

#[derive(Debug, Parser)]
#[command(name = crate_name!(), author = crate_authors!("\n"), version = crate_version!())]
#[command(about = crate_description!(), long_about = ABOUT, help_template = HELP_TEMPLATE)]
pub struct Cli {
    #[arg(short, long, help = "Enables debug level logging")]
    pub debug: bool,
    #[arg(short, long, help = "Enables trace level logging")]
    pub trace: bool,

    #[arg(
        short,
        long,
        env = "NETCONF_BIND",
        default_value = "0.0.0.0:830",
        help = "Address and port to accept SSH connections on"
    )]
    pub bind: SocketAddr,

    #[arg(
        long,
        env = "NETCONF_HOST_KEY",
        help = "Path to a PEM-encoded SSH host key"
    )]
    pub host_key: PathBuf,

    #[arg(
        long,
        value_delimiter = ',',
        env = "NETCONF_CAPABILITIES",
        help = "Extra capability URNs to advertise in <hello>, beyond base:1.0/1.1 and notifications"
    )]
    pub capability: Vec<String>,
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}
