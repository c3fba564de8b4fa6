use anstyle::AnsiColor;
use clap::builder::styling::Styles;
use clap::{ArgAction, ArgGroup, Parser};
use std::time::Duration;

use crate::packet::Mode;
use crate::session::{Config, Role};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default())
    .usage(AnsiColor::Green.on_default())
    .literal(AnsiColor::Cyan.on_default())
    .placeholder(AnsiColor::Red.on_default());

#[derive(Parser, Debug)]
#[command(name = "tftp")]
#[command(about = "A simple TFTP client", long_about = None)]
#[command(styles = STYLES)]
#[command(group(ArgGroup::new("direction").required(true).args(["get", "put"])))]
pub struct Cli {
    /// Get FILENAME from HOST
    #[arg(short, long)]
    pub get: bool,

    /// Put FILENAME to HOST
    #[arg(short, long)]
    pub put: bool,

    /// Local and remote file name
    pub filename: String,

    /// Server host name or address
    pub host: String,

    /// Server port
    #[arg(long, default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,

    /// Timeout (ms)
    #[arg(short, long, default_value_t = 2000)]
    pub timeout: u64,

    /// Max retries
    #[arg(short, long, default_value_t = crate::MAX_RETRY_COUNT)]
    pub retry: u8,

    /// Transfer mode: netascii, octet or mail
    #[arg(short, long, default_value = "octet")]
    pub mode: Mode,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn role(&self) -> Role {
        if self.get {
            Role::Download
        } else {
            Role::Upload
        }
    }

    pub fn config(&self) -> Config {
        Config {
            port: self.port,
            timeout: Duration::from_millis(self.timeout),
            max_retries: self.retry,
            mode: self.mode,
        }
    }
}
