use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "townsquare-server", version, about = "Neighborhood poll server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "townsquare.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Provision a user and print a bearer token for it
    CreateUser {
        #[arg(long)]
        username: String,
        /// Display name shown next to the user's votes
        #[arg(long)]
        name: String,
        #[arg(long)]
        avatar: Option<String>,
        #[arg(long)]
        neighborhood: Option<String>,
    },
}
