//! Ragdesk CLI
//!
//! Terminal client for the document assistant platform. Without a
//! subcommand it opens the full-screen interface.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use ragdesk::api::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, UploadProgress, UploadStage,
};
use ragdesk::chat::{ChatSession, Outcome};
use ragdesk::config::{write_config_value, SETTABLE_KEYS};
use ragdesk::format::{
    format_created_at, format_file_size, format_processing_time, short_hash, truncate_text,
};
use ragdesk::tui::{progress_bar, App};
use ragdesk::{ApiClient, RagdeskConfig, SessionContext, TopK};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Ragdesk - chat with your indexed documents from the terminal
#[derive(Parser, Debug)]
#[command(name = "ragdesk")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the platform API (overrides config and RAGDESK_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Directory for config.toml, credentials and logs
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Keep the credential in memory only
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the terminal interface (default)
    Tui,
    /// Sign in and store the access token
    Login {
        #[arg(short, long)]
        username: String,
        /// Prompted for when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Forget the stored access token
    Logout,
    /// Show the signed-in user
    Whoami {
        /// Also ask the server to validate the stored token
        #[arg(long)]
        validate: bool,
    },
    /// Ask the assistant a question
    Ask {
        #[arg(short = 'k', long)]
        top_k: Option<u8>,
        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Upload a PDF for indexing
    Upload {
        file: PathBuf,
        /// Source system the document belongs to
        #[arg(short, long)]
        system: String,
    },
    /// Browse and manage indexed documents
    Docs {
        #[command(subcommand)]
        action: DocsCommand,
    },
    /// Retrieve matching excerpts without generating an answer
    Search {
        #[arg(short = 'k', long)]
        top_k: Option<u8>,
        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Suggested questions
    Suggestions,
    /// Index statistics from the search service
    Stats,
    /// Check that the platform is up
    Health,
    /// Show or edit config.toml
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum DocsCommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        limit: Option<u32>,
    },
    Show {
        hash: String,
    },
    Delete {
        hash: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Show,
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = RagdeskConfig::load(cli.data_dir.clone())?;
    if let Some(url) = &cli.api_url {
        config = config.with_base_url(url.clone());
    }

    let command = cli.command.unwrap_or(Command::Tui);
    if matches!(command, Command::Tui) {
        init_file_logging(&config, cli.verbose)?;
    } else {
        init_stderr_logging(cli.verbose);
    }

    let credentials: Arc<dyn CredentialStore> = if cli.ephemeral {
        Arc::new(MemoryCredentialStore::new())
    } else {
        Arc::new(FileCredentialStore::new(config.credentials_path()))
    };
    let has_token = matches!(credentials.load(), Ok(Some(_)));
    let (session, session_rx) = SessionContext::new(has_token);
    let client = ApiClient::new(&config, credentials, session)?;
    debug!("Using API at {}", client.base_url());

    match command {
        Command::Tui => {
            let mut app = App::new(client, session_rx, &config)?;
            app.run().await?;
        }
        Command::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_hidden("Password: ")?,
            };
            client.login(&username, &password).await?;
            println!("Logged in as {}", username.trim());
        }
        Command::Logout => {
            client.logout().await?;
            println!("Logged out");
        }
        Command::Whoami { validate } => {
            let user = client.current_user().await?;
            match user.role {
                Some(role) => println!("{} ({role})", user.username),
                None => println!("{}", user.username),
            }
            if validate {
                let verdict = client.validate_token().await?;
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            }
        }
        Command::Ask { top_k, question } => {
            let top_k = resolve_top_k(top_k, &config)?;
            run_ask(&client, &question.join(" "), top_k).await?;
        }
        Command::Upload { file, system } => run_upload(&client, file, &system).await?,
        Command::Docs { action } => run_docs(&client, &config, action).await?,
        Command::Search { top_k, question } => {
            let top_k = resolve_top_k(top_k, &config)?;
            let found = client.semantic_search(&question.join(" "), top_k).await?;
            println!("{} excerpt(s) found", found.total_found.max(found.results.len() as u32));
            for (i, chunk) in found.results.iter().enumerate() {
                let source = chunk.source_file.as_deref().unwrap_or("unknown source");
                let score = chunk
                    .score
                    .map(|s| format!(" · score {s:.3}"))
                    .unwrap_or_default();
                println!("\n[{}] {source}{score}", i + 1);
                println!("{}", truncate_text(chunk.text.trim(), 400));
            }
        }
        Command::Suggestions => {
            let suggestions = client.suggestions().await?;
            for s in &suggestions.suggestions {
                println!("- {s}");
            }
            if let Some(basis) = suggestions.based_on {
                println!("(based on {basis})");
            }
        }
        Command::Stats => {
            let stats = client.search_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Health => {
            let health = client.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Command::Config { action } => match action {
            ConfigCommand::Show => {
                println!("base_url      = {}", config.base_url);
                println!("timeout_secs  = {}", config.timeout.as_secs());
                println!("default_top_k = {}", config.default_top_k);
                println!("page_size     = {}", config.page_size);
                println!("data_dir      = {}", config.data_dir.display());
            }
            ConfigCommand::Set { key, value } => {
                write_config_value(&config.data_dir, &key, &value).with_context(|| {
                    format!("settable keys: {}", SETTABLE_KEYS.join(", "))
                })?;
                println!("Set {key} = {value}");
            }
        },
    }

    Ok(())
}

fn init_stderr_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// The TUI owns the terminal, so logs go to `<data_dir>/ragdesk.log`
fn init_file_logging(config: &RagdeskConfig, verbose: bool) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir)?;
    let path = config.log_path();
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    info!("Starting Ragdesk {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

fn resolve_top_k(flag: Option<u8>, config: &RagdeskConfig) -> anyhow::Result<TopK> {
    Ok(TopK::new(flag.unwrap_or(config.default_top_k))?)
}

async fn run_ask(client: &ApiClient, question: &str, top_k: TopK) -> anyhow::Result<()> {
    let mut chat = ChatSession::new(top_k);
    let turn = chat.ask(client, question, top_k).await?;
    if turn.outcome == Outcome::Failure {
        bail!("{}", turn.sanitized_text);
    }

    println!("{}", turn.sanitized_text);
    let mut footer = Vec::new();
    if let Some(n) = turn.sources_count {
        footer.push(format!("{n} source(s)"));
    }
    let time = format_processing_time(turn.processing_time_seconds);
    if !time.is_empty() {
        footer.push(time);
    }
    if !footer.is_empty() {
        eprintln!("\n{}", footer.join(" · "));
    }
    Ok(())
}

async fn run_upload(client: &ApiClient, file: PathBuf, system: &str) -> anyhow::Result<()> {
    let (tx, progress) = UploadProgress::channel();
    let reporter = tokio::spawn(report_progress(progress));
    let result = client.upload_pdf(&file, system, Some(tx)).await;
    let _ = reporter.await;

    let response = result?;
    if response.message.is_empty() {
        println!("Uploaded {} ({})", file.display(), short_hash(&response.file_hash));
    } else {
        println!("{}", response.message);
    }
    Ok(())
}

async fn report_progress(progress: UploadProgress) {
    let mut stages = progress.into_stream();
    let mut stderr = io::stderr();
    while let Some(stage) = stages.next().await {
        let _ = write!(
            stderr,
            "\r{:<10} {} {:>3}%",
            stage.label(),
            progress_bar(stage.percent(), 30),
            stage.percent()
        );
        let _ = stderr.flush();
        if let UploadStage::Finished { .. } = stage {
            let _ = writeln!(stderr);
            break;
        }
    }
}

async fn run_docs(
    client: &ApiClient,
    config: &RagdeskConfig,
    action: DocsCommand,
) -> anyhow::Result<()> {
    match action {
        DocsCommand::List { page, limit } => {
            let limit = limit.unwrap_or(config.page_size);
            let listing = client.list_documents(page, limit).await?;
            if listing.documents.is_empty() {
                println!("No documents indexed yet.");
                return Ok(());
            }
            for doc in &listing.documents {
                println!(
                    "{:<12}  {:<40}  {:<16}  {:>10}  {}",
                    short_hash(&doc.file_hash),
                    truncate_text(&doc.filename, 37),
                    doc.system_name,
                    doc.file_size.map(format_file_size).unwrap_or_default(),
                    format_created_at(&doc.created_at)
                );
            }
            println!(
                "\npage {}/{} · {} document(s)",
                page.max(1),
                listing.page_count(limit),
                listing.total
            );
        }
        DocsCommand::Show { hash } => {
            let detail = client.document_detail(&hash).await?;
            let meta = &detail.metadata;
            println!("File:     {}", meta.filename);
            println!("Hash:     {}", meta.file_hash);
            println!("System:   {}", meta.system_name);
            if let Some(size) = meta.file_size {
                println!("Size:     {}", format_file_size(size));
            }
            if !meta.created_at.is_empty() {
                println!("Indexed:  {}", format_created_at(&meta.created_at));
            }
            if let Some(chunks) = detail.chunks_count {
                println!("Chunks:   {chunks}");
            }
            if let Some(accessed) = &detail.last_accessed {
                println!("Accessed: {}", format_created_at(accessed));
            }
        }
        DocsCommand::Delete { hash, yes } => {
            if !yes && !confirm(&format!("Delete {hash} from the index? [y/N] "))? {
                println!("Cancelled");
                return Ok(());
            }
            let response = client.delete_document(&hash).await?;
            if response.message.is_empty() {
                println!("Document deleted");
            } else {
                println!("{}", response.message);
            }
        }
    }
    Ok(())
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    eprint!("{question}");
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Read a line without echoing it
fn prompt_hidden(label: &str) -> anyhow::Result<String> {
    use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
    use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

    eprint!("{label}");
    io::stderr().flush()?;
    enable_raw_mode()?;
    let mut secret = String::new();
    let outcome = loop {
        let key = match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => key,
            Ok(_) => continue,
            Err(e) => break Err(e.into()),
        };
        match key.code {
            KeyCode::Enter => break Ok(()),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                break Err(anyhow::anyhow!("Cancelled"))
            }
            KeyCode::Backspace => {
                secret.pop();
            }
            KeyCode::Char(c) => secret.push(c),
            _ => {}
        }
    };
    disable_raw_mode()?;
    eprintln!();
    outcome.map(|()| secret)
}
