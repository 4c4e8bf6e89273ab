//! Leadline CLI - operator tools for the shared config and leads.
//!
//! # Usage
//!
//! ```bash
//! # Print the shared config view the site would serve
//! leadline-cli config
//!
//! # Merge-write the default metrics into the shared config document
//! leadline-cli seed
//!
//! # Submit a lead from the command line
//! leadline-cli submit -n "Acme" -c "Acme Co" -e a@acme.com -i "Quote Request"
//! ```
//!
//! Every command reads the same environment as the site binary and
//! establishes an identity first, exactly as the site does at startup.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "leadline-cli")]
#[command(author, version, about = "Leadline CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and print the shared config view
    Config,
    /// Seed the shared config document with the default metrics
    Seed,
    /// Submit a lead under this session's identity
    Submit {
        /// Contact name
        #[arg(short, long)]
        name: String,

        /// Company name
        #[arg(short, long, default_value = "")]
        company: String,

        /// Contact email address
        #[arg(short, long)]
        email: String,

        /// Contact phone number
        #[arg(short, long, default_value = "")]
        phone: String,

        /// Inquiry category (e.g. "Quote Request")
        #[arg(short, long, default_value = "")]
        inquiry: String,
    },
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "leadline_cli=info,leadline_site=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Config => commands::config::show().await?,
        Commands::Seed => commands::seed::defaults().await?,
        Commands::Submit {
            name,
            company,
            email,
            phone,
            inquiry,
        } => {
            let form = leadline_core::LeadForm {
                name,
                company,
                email,
                phone,
                inquiry,
            };
            commands::submit::lead(form).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_arguments() {
        let cli = Cli::try_parse_from([
            "leadline-cli",
            "submit",
            "-n",
            "Acme",
            "--email",
            "a@acme.com",
            "--inquiry",
            "Quote Request",
        ])
        .unwrap();

        let Commands::Submit {
            name,
            company,
            email,
            phone,
            inquiry,
        } = cli.command
        else {
            panic!("expected submit");
        };
        assert_eq!(name, "Acme");
        assert_eq!(company, "");
        assert_eq!(email, "a@acme.com");
        assert_eq!(phone, "");
        assert_eq!(inquiry, "Quote Request");
    }

    #[test]
    fn test_submit_requires_email() {
        assert!(Cli::try_parse_from(["leadline-cli", "submit", "-n", "Acme"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
