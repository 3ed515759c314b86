//! taskgate - reward-gated task tracker
//!
//! Log in with Discord, complete tasks, earn time on your license key.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use taskgate::config::{default_data_dir, GITHUB_TOKEN_ENV};
use taskgate::progress::format_countdown;
use taskgate::{
    AppConfig, AuthSession, DiscordIdentityProvider, FileKeyValueStore, FileLicenseStore,
    GithubLicenseStore, IdentityProvider, LicenseConfig, LicenseRecord, LicenseStore,
    Notification, NotificationLevel, ProcessLauncher, ProgressTracker, Result, SessionController,
    SystemClock, TaskCatalog, TaskEvent, TaskgateError, UserProfile,
};

#[derive(Parser)]
#[command(name = "taskgate")]
#[command(version)]
#[command(about = "Complete tasks to earn time on your license key", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Data directory (defaults to the platform data directory)
    #[arg(short, long, global = true, env = "TASKGATE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Config file (defaults to <data-dir>/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the Discord authorization URL
    Login,

    /// Finish logging in with the fragment of the redirect URL
    Callback {
        /// Everything after `#` in the redirect URL
        fragment: String,
    },

    /// Forget the stored login (task progress is kept)
    Logout,

    /// Show login, session progress, cooldown and license
    Status,

    /// Show your license key
    License {
        /// Issue a key if you don't have one yet
        #[arg(long)]
        create: bool,
    },

    /// List the task catalog
    Tasks,

    /// Run an interactive task session
    Run,
}

/// Everything a command needs from the environment.
struct App {
    data_dir: PathBuf,
    config: AppConfig,
    store: FileKeyValueStore,
}

impl App {
    fn load(cli: &Cli) -> Result<Self> {
        let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
        std::fs::create_dir_all(&data_dir)?;
        let config = match &cli.config {
            Some(path) => AppConfig::load_from(path)?,
            None => AppConfig::load(&data_dir)?,
        };
        Ok(Self {
            store: FileKeyValueStore::new(&data_dir),
            data_dir,
            config,
        })
    }

    fn session(&self) -> AuthSession<FileKeyValueStore> {
        AuthSession::new(self.store.clone())
    }

    fn require_login(&self) -> Result<UserProfile> {
        self.session().current().ok_or(TaskgateError::NotLoggedIn)
    }

    fn license_store(&self) -> Result<Arc<dyn LicenseStore>> {
        match &self.config.license {
            LicenseConfig::Github(ledger) => {
                let token = std::env::var(GITHUB_TOKEN_ENV).map_err(|_| {
                    TaskgateError::config(format!(
                        "{GITHUB_TOKEN_ENV} must be set for the github license backend"
                    ))
                })?;
                Ok(Arc::new(GithubLicenseStore::new(ledger.clone(), token)))
            }
            LicenseConfig::File { .. } => {
                let path = self
                    .config
                    .keys_file(&self.data_dir)
                    .ok_or_else(|| TaskgateError::config("license file path missing"))?;
                Ok(Arc::new(FileLicenseStore::new(path)))
            }
        }
    }
}

/// Recover the domain error from a collaborator failure.
fn into_taskgate(e: anyhow::Error) -> TaskgateError {
    e.downcast::<TaskgateError>().unwrap_or_else(TaskgateError::Other)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "taskgate=debug,info"
    } else {
        "taskgate=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Tasks = cli.command {
        print_catalog(&TaskCatalog::standard());
        return Ok(());
    }

    let app = App::load(&cli)?;

    match cli.command {
        Commands::Login => {
            let provider = DiscordIdentityProvider::new(app.config.discord.clone());
            let url = provider.authorize_url().map_err(into_taskgate)?;
            println!("{} Open this URL to log in:\n", "Login:".cyan().bold());
            println!("   {url}\n");
            println!(
                "Then run {} with everything after '#' in the page you land on.",
                "taskgate callback '<fragment>'".bold()
            );
        }

        Commands::Callback { fragment } => {
            let provider = DiscordIdentityProvider::new(app.config.discord.clone());
            let grant = provider
                .exchange(&fragment)
                .await
                .map_err(|e| match e.downcast::<TaskgateError>() {
                    Ok(err) => err,
                    Err(other) => TaskgateError::authentication(other.to_string()),
                })?;
            app.session().save(&grant)?;
            println!(
                "{} Logged in as {}",
                "OK".green().bold(),
                grant.profile.display_name.bold()
            );
        }

        Commands::Logout => {
            app.session().logout()?;
            println!("{} Logged out", "OK".green().bold());
        }

        Commands::Status => {
            let profile = app.require_login()?;
            print_status(&app, &profile).await?;
        }

        Commands::License { create } => {
            let profile = app.require_login()?;
            let licenses = app.license_store()?;
            let found = licenses
                .fetch_license(&profile.identity)
                .await
                .map_err(|e| TaskgateError::license_lookup(e.to_string()))?;
            let license = match (found, create) {
                (Some(license), _) => license,
                (None, true) => licenses
                    .create_license(&profile.identity, &profile.display_name)
                    .await
                    .map_err(|e| TaskgateError::license_lookup(e.to_string()))?,
                (None, false) => {
                    return Err(TaskgateError::license_lookup(
                        "no license for this account - rerun with --create",
                    ));
                }
            };
            print_license(&license);
        }

        Commands::Run => {
            let profile = app.require_login()?;
            run_session(&app, profile).await?;
        }

        Commands::Tasks => {}
    }

    Ok(())
}

fn print_catalog(catalog: &TaskCatalog) {
    println!("{}", "Tasks".cyan().bold());
    println!("{}", "─".repeat(40));
    for task in catalog.tasks() {
        println!(
            "   {:<10} {} ({}s)",
            task.id.bold(),
            task.title,
            task.required_dwell_secs
        );
        println!("   {:<10} {}", "", task.description.dimmed());
    }
}

async fn print_status(app: &App, profile: &UserProfile) -> Result<()> {
    let catalog = TaskCatalog::standard();
    let tracker = ProgressTracker::new(app.store.clone(), SystemClock, &catalog);
    let progress = tracker.load(&profile.identity);
    let now = Utc::now();

    println!(
        "{} {} ({})",
        "Account:".cyan().bold(),
        profile.display_name,
        profile.identity
    );
    println!("{}", "─".repeat(40));
    println!(
        "   This session: {}/{} tasks",
        progress.tasks_completed_this_session().len(),
        catalog.len()
    );
    println!("   Completed ever: {}", progress.completed_tasks().len());
    match progress.cooldown_remaining(now) {
        Some(remaining) => println!(
            "   Cooldown: {} remaining",
            format_countdown(remaining).yellow()
        ),
        None => println!("   Cooldown: {}", "ready".green()),
    }

    match app.license_store()?.fetch_license(&profile.identity).await {
        Ok(Some(license)) => println!(
            "   License: {} ({})",
            license.key,
            license.time_remaining_label(now)
        ),
        Ok(None) => println!("   License: {}", "none".dimmed()),
        Err(e) => println!(
            "   License: {} ({})",
            "unavailable".red(),
            TaskgateError::license_lookup(e.to_string()).user_message()
        ),
    }
    Ok(())
}

fn print_license(license: &LicenseRecord) {
    let now = Utc::now();
    println!("{} {}", "Key:".cyan().bold(), license.key.bold());
    println!("   Expires: {}", license.expires_at.format("%Y-%m-%d %H:%M UTC"));
    if license.is_expired(now) {
        println!("   {}", "Expired".red());
    } else {
        println!("   {}", license.time_remaining_label(now).green());
    }
}

fn print_tasks<S, C>(session: &SessionController<S, C>)
where
    S: taskgate::KeyValueStore,
    C: taskgate::Clock,
{
    println!();
    for task in session.tasks() {
        let marker = if task.is_completed() {
            "✓".green()
        } else {
            "•".normal()
        };
        println!(
            "   {} {:<10} {:<28} {}",
            marker,
            task.id(),
            task.definition().title,
            task.state().to_string().dimmed()
        );
    }
    if let Some(remaining) = session.cooldown_remaining() {
        println!(
            "\n   {} next session in {}",
            "Cooldown:".yellow().bold(),
            format_countdown(remaining)
        );
    }
}

fn print_notifications<S, C>(session: &mut SessionController<S, C>)
where
    S: taskgate::KeyValueStore,
    C: taskgate::Clock,
{
    for Notification { level, title, body } in session.drain_notifications() {
        let title = match level {
            NotificationLevel::Info => title.cyan().bold(),
            NotificationLevel::Success => title.green().bold(),
            NotificationLevel::Error => title.red().bold(),
        };
        println!("{title} {body}");
    }
}

fn print_help() {
    println!("Commands: start <task>, verify <task>, list, retry, license, help, quit");
}

async fn run_session(app: &App, profile: UserProfile) -> Result<()> {
    let launcher = ProcessLauncher::from_config(&app.config.launcher).ok_or_else(|| {
        TaskgateError::config("no browser found - set launcher.command in config.toml")
    })?;
    let licenses = app.license_store()?;
    let catalog = TaskCatalog::standard();

    let mut session = SessionController::open(
        profile,
        &catalog,
        app.store.clone(),
        SystemClock,
        licenses,
        Box::new(launcher),
    )
    .await;

    println!(
        "{} {}",
        "Welcome back,".cyan().bold(),
        session.profile().display_name.bold()
    );
    print_tasks(&session);
    print_notifications(&mut session);
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(100));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for event in session.pump().await {
                    match event {
                        TaskEvent::Eligible(id) => println!("{} {id} is ready - type `verify {id}`", "Ready:".green()),
                        TaskEvent::Paused(id) => println!("{} {id} window closed - `start {id}` to continue", "Paused:".yellow()),
                        TaskEvent::Completed(_) => print_tasks(&session),
                    }
                }
                print_notifications(&mut session);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_input(&mut session, line.trim()).await {
                    break;
                }
                print_notifications(&mut session);
            }
        }
    }

    session.teardown();
    Ok(())
}

/// Apply one line of user input. Returns false to quit.
async fn handle_input<S, C>(session: &mut SessionController<S, C>, input: &str) -> bool
where
    S: taskgate::KeyValueStore,
    C: taskgate::Clock,
{
    let mut parts = input.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("start"), Some(id)) => {
            if session.start_task(id) {
                println!("Opened {id}. Keep the window open.");
            } else if session.is_on_cooldown() {
                println!("{} tasks are locked until the cooldown ends", "Cooldown:".yellow());
            }
        }
        (Some("verify"), Some(id)) => {
            if session.verify_task(id) {
                println!("Verifying {id}...");
            } else {
                println!("{id} is not ready to verify yet");
            }
        }
        (Some("list" | "ls"), _) => print_tasks(session),
        (Some("retry"), _) => {
            if !session.reward_pending() {
                println!("Nothing to retry");
            } else if !session.retry_reward().await {
                println!("Reward still pending. Try {} again later.", "retry".bold());
            }
        }
        (Some("license"), _) => match session.ensure_license().await {
            Ok(license) => print_license(&license),
            Err(e) => eprintln!("{} {}", "Error:".red().bold(), e.user_message()),
        },
        (Some("quit" | "exit" | "q"), _) => return false,
        (Some("help"), _) | (None, _) => print_help(),
        _ => {
            tracing::debug!("Unrecognized input: {}", input);
            print_help();
        }
    }
    true
}
