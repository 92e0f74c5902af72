//! `nexis` command-line client.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use nexis_app::telemetry::init_tracing;
use nexis_app::{
    APP_VERSION, FlowOutcome, FlowReport, NexisClient, NexisConfig, UiProjection, load_config,
    load_config_from_path, redact_sensitive,
};
use nexis_auth::Credentials;
use nexis_ui::UiState;
use tokio_util::sync::CancellationToken;

/// Deepfake detection client for the dark-nexis backend.
#[derive(Parser, Debug)]
#[command(name = "nexis", version = APP_VERSION, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in with a username and password.
    Login {
        /// Account user name (usually an email address).
        #[arg(long)]
        username: String,
        /// Password; read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign in with the demo account.
    DemoLogin,
    /// Forget the stored session.
    Logout,
    /// Show version, backend URL and session state.
    Status,
    /// Upload a media file and wait for its verdict.
    Analyze {
        /// Image, video or audio file up to 100 MB.
        path: PathBuf,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the report download link for a file.
    Download {
        /// Backend file id.
        file_id: i64,
    },
    /// Probe the backend and the demo login.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_from_path(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => load_config().context("loading config")?,
    };
    init_tracing(&config.log_level);

    if let Err(error) = run(cli.command, config).await {
        eprintln!("nexis: {}", redact_sensitive(&format!("{error:#}")));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Commands, config: NexisConfig) -> anyhow::Result<()> {
    let client = NexisClient::from_config(config)?;

    match command {
        Commands::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => read_password()?,
            };
            if !client.login(&Credentials::new(username, password)).await {
                bail!("login failed");
            }
            println!("Signed in.");
        }
        Commands::DemoLogin => {
            if !client.demo_login().await {
                bail!("demo login failed");
            }
            println!("Signed in with the demo account.");
        }
        Commands::Logout => {
            client.logout();
            println!("Signed out.");
        }
        Commands::Status => {
            println!("nexis {APP_VERSION}");
            println!("backend:  {}", client.base_url());
            println!("session:  {}", client.config().session_path.display());
            let state = if client.is_authenticated() {
                "signed in"
            } else {
                "signed out"
            };
            println!("auth:     {state}");
        }
        Commands::Analyze { path, json } => analyze(&client, path, json).await?,
        Commands::Download { file_id } => {
            let url = client.download_report(file_id).await?;
            println!("{url}");
        }
        Commands::Check => {
            let report = client.check_connection().await;
            match &report.api_status {
                Ok(status) => println!("api {}: HTTP {status}", report.api_url),
                Err(reason) => println!("api {}: unreachable ({reason})", report.api_url),
            }
            let login = if report.demo_login { "ok" } else { "failed" };
            println!("demo login: {login}");
            if !report.all_passed() {
                bail!("connection check failed");
            }
        }
    }

    Ok(())
}

async fn analyze(client: &NexisClient, path: PathBuf, json: bool) -> anyhow::Result<()> {
    let mut initial = UiState::new(APP_VERSION);
    initial.set_authenticated(client.is_authenticated());
    let size = std::fs::metadata(&path)
        .with_context(|| format!("reading {}", path.display()))?
        .len();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    initial.select_file(&name, size);

    let projection = UiProjection::new(initial).with_listener({
        let last = std::sync::Mutex::new(String::new());
        move |state: &UiState| {
            let line = state.status_line();
            let mut last = last.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if *last != line {
                eprintln!("{line}");
                *last = line;
            }
        }
    });

    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let report = client.analyze_path(&path, &projection, &cancel).await;
    ctrl_c.abort();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.result)?);
    } else {
        print_report(&report, &projection.snapshot());
    }
    Ok(())
}

fn print_report(report: &FlowReport, state: &UiState) {
    if let Some(file) = &state.selected_file {
        println!("file:        {file}");
    }
    println!("sha256:      {}", report.fingerprint);
    if let FlowOutcome::Mocked { .. } = report.outcome {
        println!("source:      simulated (backend unavailable)");
    }
    println!("status:      {}", state.analysis_status);
    if let Some(risk) = state.risk {
        println!("risk:        {}", risk.label());
    }
    if let Some(score) = report.result.deepfake_score {
        println!("score:       {score:.3}");
    }
    if let Some(confidence) = &state.confidence {
        println!("confidence:  {confidence}");
    }
    if let Some(detail) = &report.result.report {
        let verdict = if detail.is_deepfake {
            "manipulated"
        } else {
            "authentic"
        };
        println!("verdict:     {verdict}");
        if !detail.detected_tools.is_empty() {
            println!("tools:       {}", detail.detected_tools.join(", "));
        }
        println!("model:       {}", detail.metadata.model_version);
    } else if !report.result.model_version.is_empty() {
        println!("model:       {}", report.result.model_version);
    }
    if let Some(media_id) = report.media_id.filter(|_| !report.is_mocked()) {
        println!("download:    nexis download {media_id}");
    }
}

fn read_password() -> anyhow::Result<String> {
    eprint!("password: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("no password given");
    }
    Ok(password)
}
