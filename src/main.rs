use std::path::PathBuf;

use anyhow::Context;
use channel_plugin::plugin::LogLevel;
use clap::{Args, Parser, Subcommand};
use guide_creator::{
    agent::manager::build_generator,
    apps::App,
    config::{AppSettings, ConfigManager, EnvConfigManager, SettingsOverrides},
    flow::{FlowInput, GuideCreatorFlow, plot::DEFAULT_PLOT_FILE},
    logger::{DEFAULT_EVENT_FILE, DEFAULT_LOG_FILE, FileTelemetry, init_tracing},
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "guide_creator",
    about = "Writes structured guides with an LLM and answers chat messages",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve /health, run the flow and listen on Slack (default)
    Run(RunArgs),

    /// Run only the guide creator flow
    Kickoff(RunArgs),

    /// Write the flow graph as HTML
    Plot {
        #[arg(long, default_value = DEFAULT_PLOT_FILE)]
        output: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Dotenv file loaded before reading the environment
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Log level (trace, debug, info, warn, error, critical)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Guide topic, overrides GUIDE_TOPIC
    #[arg(long)]
    topic: Option<String>,

    /// beginner, intermediate or advanced, overrides GUIDE_AUDIENCE_LEVEL
    #[arg(long)]
    audience_level: Option<String>,

    /// Overrides GUIDE_OUTPUT_DIR
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            env_file: PathBuf::from(".env"),
            log_level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            topic: None,
            audience_level: None,
            output_dir: None,
        }
    }
}

impl RunArgs {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            topic: self.topic.clone(),
            audience_level: self.audience_level.clone(),
            output_dir: self.output_dir.clone(),
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run(args).await,
        Commands::Kickoff(args) => kickoff(args).await,
        Commands::Plot { output } => {
            let flow = GuideCreatorFlow::new(None, ".");
            let path = flow.plot(&output).await?;
            println!("Flow visualization saved to {}", path.display());
            Ok(())
        }
    }
}

/// Load the env file, install logging and resolve settings.
async fn setup(args: &RunArgs) -> anyhow::Result<(ConfigManager, AppSettings, FileTelemetry)> {
    let telemetry = init_tracing(
        &args.log_dir,
        DEFAULT_LOG_FILE,
        DEFAULT_EVENT_FILE,
        LogLevel::from_name(&args.log_level),
    )?;
    let config = ConfigManager(EnvConfigManager::new(args.env_file.clone()));
    let settings = AppSettings::resolve(&config, args.overrides())
        .await
        .context("invalid configuration")?;
    Ok((config, settings, telemetry))
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let (config, settings, telemetry) = setup(&args).await?;
    info!("guide creator starting up");

    let app = App::bind(config, settings, telemetry).await?;
    println!("Health endpoint on http://{}/health, press Ctrl-C to exit", app.health_addr());

    let result = app.run().await;
    match &result {
        Ok(()) => info!("guide creator stopped"),
        Err(e) => error!("guide creator stopped: {e:#}"),
    }
    result
}

async fn kickoff(args: RunArgs) -> anyhow::Result<()> {
    let (config, settings, telemetry) = setup(&args).await?;

    let input = settings
        .topic
        .clone()
        .map(|topic| FlowInput::new(topic, settings.audience_level.clone()));
    let generator = match input {
        Some(_) => Some(build_generator(&config).await.context("could not set up the content generator")?),
        None => None,
    };

    let mut flow = GuideCreatorFlow::new(generator, settings.output_dir).with_telemetry(telemetry);
    let outcome = flow.kickoff(input).await.context("guide creator flow failed")?;

    println!("\n=== Flow Complete ===");
    match outcome.guide_path {
        Some(path) => {
            println!("Your comprehensive guide is ready in the output directory.");
            println!("Open {} to view it.", path.display());
        }
        None => println!("No topic given (use --topic or GUIDE_TOPIC), nothing was generated."),
    }
    Ok(())
}
