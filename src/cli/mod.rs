//! CLI module - Command-line interface for academy-admin
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};

/// academy-admin - Admin console back end for the academy
#[derive(Parser)]
#[command(name = "academy-admin")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    #[command(alias = "web")]
    Serve,

    /// Create the admin schema and the bootstrap admin if none exists
    InitDb,

    /// Provision an admin for username/password login
    AddAdmin {
        #[arg(long)]
        username: String,

        #[arg(long)]
        password: String,

        /// Email matched against identity tokens under the allow-list policy
        #[arg(long)]
        email: Option<String>,
    },

    /// List provisioned admins
    #[command(alias = "ls")]
    ListAdmins,

    /// Copy admins from the SQLite database into Firestore
    MigrateAdmins,

    /// Sign in through the identity provider and print the session holder
    Whoami {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        /// Base URL of a running server (default: http://127.0.0.1:<server.port>)
        #[arg(long)]
        server: Option<String>,
    },

    /// Create default config file
    #[command(alias = "--init")]
    Init,
}

pub use commands::*;
