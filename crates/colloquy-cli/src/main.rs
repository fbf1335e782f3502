use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colloquy_application::AppContext;
use colloquy_core::chat::{ChatKind, DEFAULT_CHAT_ID};
use colloquy_core::session::ResponseFormat;
use colloquy_infrastructure::ColloquyPaths;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "colloquy")]
#[command(about = "Colloquy - multi-agent chat with history compaction", long_about = None)]
struct Cli {
    /// Session id used for messages and preferences
    #[arg(long, global = true, default_value = "cli")]
    session: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message to a chat and print the stored result
    Send {
        text: String,
        #[arg(long, default_value = DEFAULT_CHAT_ID)]
        chat: String,
    },
    /// Print a chat's messages
    History {
        #[arg(long, default_value = DEFAULT_CHAT_ID)]
        chat: String,
    },
    /// List chats
    Chats,
    /// Create a chat
    NewChat {
        name: String,
        #[arg(long, default_value = "standard")]
        kind: ChatKind,
        #[arg(long)]
        system_prompt: Option<String>,
    },
    /// Delete all messages of a chat
    Clear {
        #[arg(long, default_value = DEFAULT_CHAT_ID)]
        chat: String,
    },
    /// Log in (the first login sets the password) and print the session salt
    Login { password: String },
    /// Set the reply format preference (json, xml or default)
    Format { format: ResponseFormat },
    /// List tools of the configured endpoints
    Tools,
    /// List selectable agents, marking the session's choice
    Agents,
    /// Select the agent that answers this session
    UseAgent { key: String },
}

fn init_logging(paths: &ColloquyPaths) -> Result<WorkerGuard> {
    let logs_dir = paths.logs_dir();
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("creating log directory {}", logs_dir.display()))?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&logs_dir, "colloquy.log"));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = ColloquyPaths::resolve()?;
    let _log_guard = init_logging(&paths)?;
    tracing::debug!(
        "[CLI] config={} data={}",
        paths.config_dir().display(),
        paths.data_dir().display()
    );

    let ctx = AppContext::build(&paths)
        .await
        .context("failed to initialize Colloquy")?;
    let session = cli.session.as_str();

    match cli.command {
        Commands::Send { text, chat } => {
            let stored = ctx.conversations.send_message(session, &chat, &text).await?;
            for message in stored {
                println!("{}\n", message.data.transcript_line());
            }
        }
        Commands::History { chat } => {
            for message in ctx.conversations.list_messages(&chat).await? {
                println!("{}\n", message.data.transcript_line());
            }
        }
        Commands::Chats => {
            for chat in ctx.conversations.list_chats().await? {
                println!("{}\t{}\t{}", chat.id, chat.kind, chat.name);
            }
        }
        Commands::NewChat {
            name,
            kind,
            system_prompt,
        } => {
            let chat = ctx
                .conversations
                .create_chat(&name, kind, system_prompt.as_deref())
                .await?;
            println!("{}", chat.id);
        }
        Commands::Clear { chat } => {
            let removed = ctx.conversations.clear_chat(&chat).await?;
            println!("removed {removed} message(s)");
        }
        Commands::Login { password } => match ctx.sessions.login(session, &password).await? {
            Some(salt) => println!("{salt}"),
            None => anyhow::bail!("wrong password for session '{session}'"),
        },
        Commands::Format { format } => {
            ctx.sessions.set_response_format(session, format).await?;
            println!("format set to {format}");
        }
        Commands::Tools => {
            for (endpoint, tool) in ctx.conversations.list_tools().await? {
                println!("{endpoint}\t{}\t{}", tool.name, tool.description);
            }
        }
        Commands::Agents => {
            let selected = ctx
                .sessions
                .get_agent_key(session)
                .await?
                .unwrap_or_else(|| ctx.agents.main.id().to_string());
            for key in ctx.conversations.list_agents() {
                let marker = if key == selected { "*" } else { " " };
                println!("{marker} {key}");
            }
        }
        Commands::UseAgent { key } => {
            ctx.conversations.select_agent(session, &key).await?;
            println!("agent set to {key}");
        }
    }

    Ok(())
}
