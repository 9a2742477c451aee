use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// ShopAssist: authenticated shopping-assistant gateway
#[derive(Parser)]
#[command(name = "shopassist", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to bind (defaults to SHOPASSIST_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage accounts directly in the credential store
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Talk to a running gateway as an end user
    Client {
        /// Gateway base URL
        #[arg(long, env = "SHOPASSIST_SERVER", default_value = "http://localhost:3000")]
        server: String,

        /// Where the bearer token is kept between invocations
        #[arg(long, default_value = ".shopassist_token")]
        token_file: PathBuf,

        #[command(subcommand)]
        command: ClientCommands,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// List every account
    List,
    /// Change an account's role
    SetRole {
        #[arg(long)]
        email: String,
        /// member | admin
        #[arg(long)]
        role: String,
    },
    /// Delete an account
    Delete {
        #[arg(long)]
        email: String,
    },
}

#[derive(Subcommand)]
pub enum ClientCommands {
    /// Create an account and log in
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Must match --password
        #[arg(long)]
        confirm: String,
    },
    /// Log in and keep the token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored token
    Logout,
    /// Show the logged-in account
    Whoami,
    /// Ask the shopping assistant
    Ask {
        /// Free-text shopping question
        query: Vec<String>,
    },
}
