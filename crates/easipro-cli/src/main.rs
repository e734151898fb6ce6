use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use easipro_cli::config::{self, CredentialSource, EasiproConfig};
use easipro_cli::{connect, runner};
use easipro_instruments::instrument_for;
use eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "easipro")]
#[command(about = "Run adaptive patient-reported outcome questionnaires from a FHIR CAT server")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save the server URL and credentials
    Configure {
        /// FHIR base URL of the adaptive server
        #[arg(long)]
        base_url: String,
        /// Client id; omit both id and secret to read them from the environment
        #[arg(long, requires = "client_secret")]
        client_id: Option<String>,
        /// Client secret
        #[arg(long, requires = "client_id")]
        client_secret: Option<String>,
        /// Bound on one next-q round trip, in seconds
        #[arg(long, default_value_t = config::DEFAULT_ROUND_TRIP_TIMEOUT_SECS)]
        round_trip_timeout_secs: u64,
    },
    /// Show the saved configuration with secrets redacted
    Config,
    /// Delete the saved configuration
    Reset,
    /// List the questionnaires offered by the server
    Discover,
    /// Run a questionnaire in the terminal
    Run {
        /// Questionnaire id on the server
        questionnaire_id: String,
        /// Write the completed response Bundle to this file
        #[arg(long)]
        bundle_out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Configure {
            base_url,
            client_id,
            client_secret,
            round_trip_timeout_secs,
        } => {
            let credentials = match (client_id, client_secret) {
                (Some(client_id), Some(client_secret)) => CredentialSource::Inline {
                    client_id,
                    client_secret,
                },
                _ => CredentialSource::Environment,
            };
            let config = EasiproConfig {
                config_version: 0,
                base_url,
                round_trip_timeout_secs,
                created_at: jiff::Timestamp::now(),
                credentials,
            };
            // Fail early on a malformed URL or missing environment credentials.
            connect::connect(&config)?;
            config::save_config(&config)?;
            println!("Saved configuration to {}", config::config_path()?.display());
        }
        Command::Config => {
            if !config::has_config() {
                println!("No configuration saved. Run `easipro configure` first.");
                return Ok(());
            }
            let info = config::config_info(&config::load_config()?);
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Reset => {
            config::delete_config()?;
            println!("Configuration deleted.");
        }
        Command::Discover => {
            let config = config::load_config()?;
            let server = connect::connect(&config)?;
            let questionnaires = server.discover().await?;
            if questionnaires.is_empty() {
                println!("No questionnaires found.");
            }
            for questionnaire in questionnaires {
                println!(
                    "{}\t{}",
                    questionnaire.id.as_deref().unwrap_or("-"),
                    questionnaire.title.as_deref().unwrap_or("(untitled)")
                );
            }
        }
        Command::Run {
            questionnaire_id,
            bundle_out,
        } => {
            let config = config::load_config()?;
            let server = Arc::new(connect::connect(&config)?);
            let questionnaire = server.fetch_questionnaire(&questionnaire_id).await?;

            let instrument = instrument_for(questionnaire)?;
            let context = connect::session_context(&config, server);
            let mut task = instrument.generate_task(&context)?;

            let input = tokio::io::BufReader::new(tokio::io::stdin());
            let mut output = std::io::stdout();
            let results = runner::run_task(task.as_mut(), input, &mut output).await?;

            match instrument.generate_response_bundle(task.as_ref(), &results)? {
                Some(bundle) => match bundle_out {
                    Some(path) => {
                        std::fs::write(&path, serde_json::to_string_pretty(&bundle)?)?;
                        info!(path = %path.display(), "response bundle written");
                        println!("Response saved to {}", path.display());
                    }
                    None => println!("{}", serde_json::to_string_pretty(&bundle)?),
                },
                None => println!("The questionnaire was not completed."),
            }
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
