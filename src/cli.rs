use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay server on the built-in default addresses.
    Server,
    /// Connect to the relay and chat from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Your preferred username.
    pub username: String,

    /// Path to an alternate config file, defaults to relaychat.json.
    #[arg(long)]
    pub config_file: Option<PathBuf>,
}
