//! Tether - command-line entry point
//!
//! Parses and renders cURL commands, lists protocols and placeholders, and
//! runs handshake definition files against live endpoints.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (defaults to <config dir>/tether/settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a cURL command and print its structure as JSON
    Parse {
        /// The command text, or `-` to read stdin
        command: String,
    },

    /// Check that a cURL command can be executed
    Validate {
        /// The command text, or `-` to read stdin
        command: String,
    },

    /// Resolve the placeholders in a template
    Render {
        /// The template text, or `-` to read stdin
        template: String,

        /// Value for {INPUT}
        #[arg(long)]
        input: Option<String>,

        /// User variable as NAME=VALUE (repeatable)
        #[arg(long = "var", value_parser = commands::parse_variable)]
        variables: Vec<(String, String)>,

        /// Fail on unresolved placeholders
        #[arg(long)]
        strict: bool,
    },

    /// List the built-in placeholders
    Placeholders,

    /// List the registered protocol types
    Protocols,

    /// Execute a handshake definition (.json, .yaml or .yml)
    Run {
        /// Definition file
        file: PathBuf,

        /// Value for {INPUT}
        #[arg(long)]
        input: Option<String>,

        /// User variable as NAME=VALUE (repeatable)
        #[arg(long = "var", value_parser = commands::parse_variable)]
        variables: Vec<(String, String)>,

        /// Directory where the run log is stored
        #[arg(long)]
        store: Option<PathBuf>,

        /// Print the finished run as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tether_infrastructure::init_tracing("info")?;

    match args.command {
        Command::Parse { command } => commands::parse(&commands::read_text(&command)?)?,
        Command::Validate { command } => commands::validate(&commands::read_text(&command)?)?,
        Command::Render {
            template,
            input,
            variables,
            strict,
        } => {
            let settings = commands::load_settings(args.settings.as_deref()).await?;
            commands::render(
                &commands::read_text(&template)?,
                input,
                variables,
                strict || settings.strict_placeholders,
                &settings,
            )?;
        }
        Command::Placeholders => commands::placeholders(),
        Command::Protocols => {
            let settings = commands::load_settings(args.settings.as_deref()).await?;
            commands::protocols(&settings)?;
        }
        Command::Run {
            file,
            input,
            variables,
            store,
            json,
        } => {
            let settings = commands::load_settings(args.settings.as_deref()).await?;
            let options = commands::RunOptions {
                input,
                variables,
                store,
                json,
            };
            commands::run(&file, options, settings).await?;
        }
    }

    Ok(())
}
