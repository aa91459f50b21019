//! CLI argument parsing for the supplydesk-server binary.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "supplydesk-server", about = "Supplydesk back office server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Create or update an owner account interactively
    CreateAdmin {
        /// Owner email address
        #[arg(long)]
        email: String,
    },
    /// Set a new password for an existing account and re-activate it
    ResetAdmin {
        /// Account email address
        #[arg(long)]
        email: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_migrate_command_parses() {
        let cli = Cli::parse_from(["supplydesk-server", "migrate"]);
        assert!(matches!(cli.command, Some(Command::Migrate)));
    }

    #[test]
    fn test_cli_no_command_defaults_to_none() {
        let cli = Cli::parse_from(["supplydesk-server"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_serve_command_parses() {
        let cli = Cli::parse_from(["supplydesk-server", "serve"]);
        assert!(matches!(cli.command, Some(Command::Serve)));
    }

    #[test]
    fn test_cli_reset_admin_requires_email() {
        let cli = Cli::parse_from(["supplydesk-server", "reset-admin", "--email", "boss@example.com"]);
        assert!(matches!(cli.command, Some(Command::ResetAdmin { ref email }) if email == "boss@example.com"));
        assert!(Cli::try_parse_from(["supplydesk-server", "reset-admin"]).is_err());
    }
}
