mod display;
mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use survey_assist_ai::{FollowUpDeriver, map_lookup};
use survey_assist_core::{ClassifyRequest, Flavour, QuestionCatalog, SurveyConfig};
use survey_assist_engine::{NavigationController, SurveyService};
use survey_assist_store::{FileStore, MemoryStore};
use survey_assist_sync::ApiClient;

#[derive(Parser)]
#[command(name = "survey-assist")]
#[command(about = "Survey Assist questionnaire engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Survey configuration file (TOML)
    #[arg(long, global = true, default_value = "config/survey.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer the survey in the terminal
    Run {
        /// Question catalog (JSON)
        #[arg(long, default_value = "config/catalog.json")]
        catalog: PathBuf,

        /// Participant (case) identifier recorded in the result
        #[arg(long, default_value = "cli-participant")]
        participant: String,

        /// Keep session state as JSON files in this directory
        #[arg(long)]
        session_dir: Option<PathBuf>,
    },

    /// Look up an organisation description in the code index
    Lookup {
        /// sic or soc
        #[arg(long, default_value = "sic")]
        flavour: Flavour,

        description: String,
    },

    /// Classify a job and show the follow-up questions it would produce
    Classify {
        /// sic or soc
        #[arg(long, default_value = "sic")]
        flavour: Flavour,

        #[arg(long)]
        job_title: String,

        #[arg(long)]
        job_description: String,

        #[arg(long)]
        org_description: String,
    },

    /// Validate a question catalog against the survey configuration
    CheckCatalog {
        #[arg(default_value = "config/catalog.json")]
        catalog: PathBuf,
    },

    /// Print the classification service's own configuration
    ApiConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("survey-assist v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            catalog,
            participant,
            session_dir,
        } => cmd_run(config, &catalog, &participant, session_dir.as_deref()).await,
        Commands::Lookup {
            flavour,
            description,
        } => cmd_lookup(&config, flavour, &description).await,
        Commands::Classify {
            flavour,
            job_title,
            job_description,
            org_description,
        } => {
            let request = ClassifyRequest {
                flavour,
                job_title: &job_title,
                job_description: &job_description,
                org_description: &org_description,
            };
            cmd_classify(&config, request).await
        }
        Commands::CheckCatalog { catalog } => cmd_check_catalog(&config, &catalog),
        Commands::ApiConfig => cmd_api_config(&config).await,
    }
}

/// Missing config file means defaults; a malformed one is an error.
fn load_config(path: &Path) -> anyhow::Result<SurveyConfig> {
    if path.exists() {
        return SurveyConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()));
    }
    tracing::warn!(path = %path.display(), "config file not found, using defaults");
    let mut config = SurveyConfig::default();
    config.apply_env();
    Ok(config)
}

// ── Commands ──

async fn cmd_run(
    config: SurveyConfig,
    catalog_path: &Path,
    participant: &str,
    session_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let catalog = QuestionCatalog::load(catalog_path)
        .with_context(|| format!("loading catalog from {}", catalog_path.display()))?;
    let client = Arc::new(ApiClient::from_config(&config.api)?);
    let controller =
        NavigationController::new(Arc::new(catalog), Arc::new(config), client.clone(), client);

    match session_dir {
        Some(dir) => {
            let store = FileStore::open(dir)
                .with_context(|| format!("opening session directory {}", dir.display()))?;
            run::run_survey(&SurveyService::new(controller, store), participant).await
        }
        None => {
            run::run_survey(&SurveyService::new(controller, MemoryStore::new()), participant).await
        }
    }
}

async fn cmd_lookup(
    config: &SurveyConfig,
    flavour: Flavour,
    description: &str,
) -> anyhow::Result<()> {
    let client = ApiClient::from_config(&config.api)?;
    let payload = client
        .lookup_raw(flavour, description)
        .await
        .with_context(|| format!("{flavour} lookup against {}", client.base_url()))?;
    let response = map_lookup(payload, config.api.max_codes, config.api.max_divisions);
    display::print_lookup(flavour, description, &response);
    Ok(())
}

async fn cmd_classify(config: &SurveyConfig, request: ClassifyRequest<'_>) -> anyhow::Result<()> {
    let client = ApiClient::from_config(&config.api)?;
    let response = client
        .classify_raw(request)
        .await
        .with_context(|| format!("{} classification against {}", request.flavour, client.base_url()))?;
    let Some(result) = response.result_for(request.flavour) else {
        bail!("classification response contained no results");
    };

    let specs = FollowUpDeriver::new(config.survey_assist.randomise_options)
        .derive(result, request.flavour);
    display::print_classification(result, &specs);
    Ok(())
}

fn cmd_check_catalog(config: &SurveyConfig, path: &Path) -> anyhow::Result<()> {
    let catalog = QuestionCatalog::load(path)
        .with_context(|| format!("loading catalog from {}", path.display()))?;

    let mut problems = catalog.routing_problems(&config.routing.allowed_routes);
    for interaction in &config.survey_assist.interactions {
        if catalog.by_id(&interaction.after_question_id).is_none() {
            problems.push(format!(
                "interaction after '{}' does not match any question",
                interaction.after_question_id
            ));
        }
        if !interaction.is_known_kind() {
            problems.push(format!("unknown interaction type '{}'", interaction.kind));
        }
    }

    display::print_catalog(&catalog, config);
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("  problem: {problem}");
        }
        bail!("{} problem(s) found in {}", problems.len(), path.display());
    }
    println!("Catalog OK");
    Ok(())
}

async fn cmd_api_config(config: &SurveyConfig) -> anyhow::Result<()> {
    let client = ApiClient::from_config(&config.api)?;
    let remote = client
        .service_config()
        .await
        .with_context(|| format!("fetching config from {}", client.base_url()))?;
    println!("{}", serde_json::to_string_pretty(&remote)?);
    Ok(())
}
