// MindHarbor - Grounded support chat with a classical retrieval core
// License: Apache-2.0

use clap::{Parser, Subcommand};
use mindharbor::agent::SupportAgent;
use mindharbor::config::Config;
use mindharbor::ingest::{ingest, DirectorySource};
use mindharbor::retrieval::{Chunker, Index};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const LOGO: &str = "⚓";

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "mindharbor",
    about = "MindHarbor - Grounded mental health support chat",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chat API server
    Serve {
        /// Config file path
        #[arg(short, long)]
        config: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Chat from the terminal (one-shot or interactive)
    Chat {
        /// One-shot message to send
        #[arg(short, long)]
        message: Option<String>,
        /// User id the conversation belongs to
        #[arg(short, long, default_value = "local")]
        user: String,
        /// Config file path
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Ingest the documents directory and build the index
    Index {
        /// Config file path
        #[arg(short, long)]
        config: Option<String>,
        /// Persist the built index to `knowledge.index_path`
        #[arg(short, long)]
        save: bool,
    },
    /// Show status of configuration and knowledge base
    Status {
        /// Config file path
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Show version information
    Version,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    mindharbor::logger::init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { config, port }) => {
            serve_cmd(config, port).await;
        }
        Some(Commands::Chat {
            message,
            user,
            config,
        }) => {
            chat_cmd(message, user, config).await;
        }
        Some(Commands::Index { config, save }) => {
            index_cmd(config, save).await;
        }
        Some(Commands::Status { config }) => {
            status_cmd(config).await;
        }
        Some(Commands::Version) => {
            version_cmd();
        }
        None => {
            // Default: interactive chat
            chat_cmd(None, "local".into(), None).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Serve command
// ---------------------------------------------------------------------------

async fn serve_cmd(config_path: Option<String>, port: Option<u16>) {
    let cfg = load_config(config_path.as_deref());
    let port = port.unwrap_or(cfg.server.port);
    let host = cfg.server.host.clone();

    let agent = build_agent(cfg).await;

    let addr: std::net::SocketAddr = match format!("{}:{}", host, port).parse() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{} Invalid listen address {}:{}: {}", LOGO, host, port, e);
            std::process::exit(1);
        }
    };

    println!("{} MindHarbor API listening on http://{}", LOGO, addr);

    if let Err(e) = mindharbor::web::start_web_server(addr, agent).await {
        eprintln!("{} Server error: {}", LOGO, e);
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Chat command
// ---------------------------------------------------------------------------

async fn chat_cmd(message: Option<String>, user: String, config_path: Option<String>) {
    let cfg = load_config(config_path.as_deref());
    let agent = build_agent(cfg).await;

    match message {
        Some(msg) => {
            // One-shot mode
            match agent.handle_user_message(&user, &msg).await {
                Ok(reply) => println!("{}", reply.response_text),
                Err(e) => {
                    eprintln!("{} Error: {}", LOGO, e);
                    std::process::exit(1);
                }
            }
        }
        None => interactive_mode(agent, &user).await,
    }
}

/// Interactive readline-based chat.
async fn interactive_mode(agent: Arc<SupportAgent>, user: &str) {
    println!("{} MindHarbor v{} - support chat", LOGO, mindharbor::VERSION);
    println!("Type your message and press Enter. Type 'exit' or Ctrl+D to quit, /help for commands.\n");

    let mut rl = match rustyline::DefaultEditor::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to initialize readline: {}", e);
            simple_interactive_mode(agent, user).await;
            return;
        }
    };

    loop {
        match rl.readline(&format!("{} > ", LOGO)) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed == "exit" || trimmed == "quit" {
                    println!("Take care. 👋");
                    break;
                }

                let _ = rl.add_history_entry(trimmed);

                // Handle slash commands
                if trimmed.starts_with('/') {
                    handle_slash_command(&agent, user, trimmed).await;
                    continue;
                }

                match agent.handle_user_message(user, trimmed).await {
                    Ok(reply) => println!("\n{}\n", reply.response_text),
                    Err(e) => eprintln!("\n{} {}\n", LOGO, e),
                }
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("\nTake care. 👋");
                break;
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("\nUse 'exit' to quit or Ctrl+D to exit.");
            }
            Err(e) => {
                eprintln!("Readline error: {}", e);
                break;
            }
        }
    }
}

async fn handle_slash_command(agent: &SupportAgent, user: &str, input: &str) {
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    match parts[0] {
        "/new" => match agent.start_new_session(user).await {
            Ok(session) => {
                let greeting = session
                    .messages
                    .last(1)
                    .pop()
                    .map(|m| m.content)
                    .unwrap_or_default();
                println!("\n{}\n", greeting);
            }
            Err(e) => eprintln!("{} {}\n", LOGO, e),
        },
        "/history" => {
            let limit = parts.get(1).and_then(|s| s.trim().parse().ok());
            let sessions = agent.list_recent_sessions(user, limit).await;
            if sessions.is_empty() {
                println!("No sessions yet.\n");
                return;
            }
            for s in sessions {
                println!(
                    "  {} {}  {}  {} messages  (updated {})",
                    if s.is_active { "●" } else { "○" },
                    &s.id[..8.min(s.id.len())],
                    s.title,
                    s.message_count,
                    s.updated_at.format("%Y-%m-%d %H:%M"),
                );
            }
            println!();
        }
        "/metrics" => {
            let report = agent.metrics().format_report().await;
            println!("{}\n", report);
        }
        "/help" => {
            println!("Commands:");
            println!("  /new          - Start a new session");
            println!("  /history [n]  - List recent sessions");
            println!("  /metrics      - Show response metrics");
            println!("  /help         - Show this help");
            println!("  exit          - Quit\n");
        }
        _ => println!("Unknown command: {} (try /help)\n", parts[0]),
    }
}

/// Simple fallback interactive mode using stdin.
async fn simple_interactive_mode(agent: Arc<SupportAgent>, user: &str) {
    use std::io::BufRead;

    println!("(Simple mode - type your message and press Enter)\n");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(input) => {
                let trimmed = input.trim().to_string();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed == "exit" || trimmed == "quit" {
                    break;
                }

                match agent.handle_user_message(user, &trimmed).await {
                    Ok(reply) => println!("\n{}\n", reply.response_text),
                    Err(e) => eprintln!("\n{} {}\n", LOGO, e),
                }
            }
            Err(_) => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Index command
// ---------------------------------------------------------------------------

async fn index_cmd(config_path: Option<String>, save: bool) {
    let cfg = load_config(config_path.as_deref());
    validate_or_exit(&cfg);

    let dir = match cfg.documents_path() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("{} Error: {}", LOGO, e);
            std::process::exit(1);
        }
    };

    println!("{} Ingesting {}", LOGO, dir.display());
    let report = ingest(&DirectorySource::new(&dir));
    for failure in &report.failures {
        println!("  ⚠️  {}", failure);
    }

    let chunker = Chunker::new(cfg.knowledge.chunk_size, cfg.knowledge.chunk_overlap);
    let chunks = chunker.chunk_all(&report.documents);
    println!(
        "  Documents: {} loaded, {} failed",
        report.documents.len(),
        report.failures.len()
    );
    println!("  Chunks:    {}", chunks.len());

    let index = match Index::build(chunks) {
        Ok(i) => i,
        Err(e) => {
            println!("  Index:     not built ({}); chat will use fallback responses", e);
            return;
        }
    };
    println!("  Terms:     {}", index.vocabulary().len());

    if save {
        match cfg.index_path() {
            Ok(Some(path)) => match index.save(&path) {
                Ok(()) => println!("  Saved:     {}", path.display()),
                Err(e) => {
                    eprintln!("{} Failed to save index: {}", LOGO, e);
                    std::process::exit(1);
                }
            },
            Ok(None) => {
                eprintln!("{} knowledge.index_path is not configured", LOGO);
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("{} Error: {}", LOGO, e);
                std::process::exit(1);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Other commands
// ---------------------------------------------------------------------------

fn version_cmd() {
    println!("{} MindHarbor v{}", LOGO, mindharbor::VERSION);
    println!("  Built with Rust 🦀");
    println!("  TF-IDF grounded support chat");
}

async fn status_cmd(config_path: Option<String>) {
    println!("{} MindHarbor Status\n", LOGO);

    let cfg = load_config(config_path.as_deref());

    // Config status
    let config_path = config_path
        .map(PathBuf::from)
        .or_else(|| Config::default_path().ok())
        .unwrap_or_default();
    if config_path.exists() {
        println!("  Config:    ✅ {}", config_path.display());
    } else {
        println!("  Config:    ❌ Not found (using defaults)");
    }

    // Documents
    match cfg.documents_path() {
        Ok(dir) if dir.is_dir() => println!("  Documents: ✅ {}", dir.display()),
        Ok(dir) => println!("  Documents: ❌ {} (missing, fallback-only)", dir.display()),
        Err(_) => println!("  Documents: ❌ Could not resolve path"),
    }

    match cfg.index_path() {
        Ok(Some(path)) if path.exists() => println!("  Index:     ✅ {}", path.display()),
        Ok(Some(path)) => println!("  Index:     ❌ {} (not saved yet)", path.display()),
        _ => println!("  Index:     built at startup"),
    }

    match cfg.sessions_path() {
        Ok(Some(dir)) => println!("  Sessions:  {}", dir.display()),
        Ok(None) => println!("  Sessions:  in memory"),
        Err(_) => println!("  Sessions:  ❌ Could not resolve path"),
    }

    println!("  Model:     {}", cfg.generator.model);
    if cfg.has_generator() {
        println!("  Generator: ✅ key configured");
    } else {
        println!("  Generator: ❌ No API key found (fallback responses only)");
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&str>) -> Config {
    let config_path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        Config::default_path().unwrap_or_else(|_| PathBuf::from("config.json"))
    };

    Config::load(&config_path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}, using defaults", e);
        Config::default()
    })
}

fn validate_or_exit(cfg: &Config) {
    if let Err(e) = cfg.validate() {
        eprintln!("{} Configuration Error: {}", LOGO, e);
        std::process::exit(1);
    }
}

/// Build the agent and load its knowledge base. Ctrl+C during the build
/// cancels it; chat then starts in fallback-only mode.
async fn build_agent(cfg: Config) -> Arc<SupportAgent> {
    validate_or_exit(&cfg);

    let agent = match SupportAgent::from_config(cfg).await {
        Ok(a) => Arc::new(a),
        Err(e) => {
            eprintln!("{} Error: {}", LOGO, e);
            std::process::exit(1);
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.store(true, Ordering::Relaxed);
            }
        })
    };

    match agent.load_knowledge(cancel).await {
        Ok(status) => tracing::info!(
            state = status.state,
            chunks = status.chunks,
            vocabulary = status.vocabulary,
            "Knowledge base ready"
        ),
        Err(e) => tracing::warn!("Knowledge base not loaded, using fallback responses: {}", e),
    }
    watcher.abort();

    agent
}
