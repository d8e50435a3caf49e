//! Parse from either cli or environment var

use std::net::Ipv4Addr;
use std::path::PathBuf;

pub use clap::Parser;

/// the default path to the handler's config file
pub static DEFAULT_CONFIG_PATH: &str = "/var/lib/dhcp-lease-handler/config.txt";
/// default log level. Can use this argument or DHCP_LOG env var
pub const DEFAULT_DHCP_LOG: &str = "info";

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[clap(author, name = "dhcp-lease-handler", bin_name = "dhcp-lease-handler", about, long_about = None)]
/// parses from cli & environment var. Loads `.env` from the current directory as well
pub struct Config {
    /// path to the handler's config file
    #[clap(short, long, value_parser, env, default_value = DEFAULT_CONFIG_PATH)]
    pub config_path: PathBuf,
    /// this server's own IPv4 address, used to recognize REQUESTs addressed to us
    #[clap(long, env, value_parser)]
    pub server_ip: Ipv4Addr,
    /// set the log level. All valid RUST_LOG arguments are accepted
    #[clap(long, env, value_parser, default_value = DEFAULT_DHCP_LOG)]
    pub dhcp_log: String,
}
