// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use chatter::api::{UserQuery, PAGE_SIZE};
use chatter::bus::{ChatEvent, EventKind, SessionEvent};
use chatter::config::ClientConfig;
use chatter::debounce::TypingNotifier;
use chatter::model::{Conversation, Message, RegisterRequest, User, UserSettings};
use chatter::token::ThemeMode;
use chatter::typing::TypingTracker;
use chatter::Client;

/// Terminal client for the chat service.
#[derive(Debug, Parser)]
#[command(name = "chatter", version)]
struct Cli {
    #[command(flatten)]
    client: ClientConfig,

    /// Log format (json or text).
    #[arg(long, env = "CHATTER_LOG_FORMAT", default_value = "text")]
    log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "CHATTER_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and store the session.
    Login {
        /// Username or email address.
        username: String,
        /// Password. Read from stdin when omitted.
        #[arg(long, env = "CHATTER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account.
    Register(RegisterArgs),
    /// Forget the stored session.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// List or search conversations.
    Conversations {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = PAGE_SIZE)]
        page_size: u32,
    },
    /// Show a page of a conversation's history.
    Messages {
        conversation: i64,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = PAGE_SIZE)]
        page_size: u32,
    },
    /// Send a text message.
    Send { conversation: i64, text: String },
    /// List or search users.
    Contacts {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Open (or create) a direct conversation with a user.
    Dm { username: String },
    /// Follow live messages; with a conversation, lines typed on stdin are sent to it.
    Watch {
        #[arg(long)]
        conversation: Option<i64>,
    },
    /// Show or change the theme preference.
    Theme {
        /// `light`, `dark` or `toggle`.
        mode: Option<String>,
    },
}

#[derive(Debug, clap::Args)]
struct RegisterArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    email: String,
    #[arg(long, env = "CHATTER_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long, default_value = "")]
    first_name: String,
    #[arg(long, default_value = "")]
    last_name: String,
    #[arg(long, default_value = "")]
    phone: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, &cli.log_format);
    let _ = rustls::crypto::ring::default_provider().install_default();

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(level: &str, format: &str) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let result = match format {
        "json" => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init(),
    };
    drop(result);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = Client::open(cli.client)?;

    match cli.command {
        Command::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => read_line("password: ").await?,
            };
            let user = client.session().login(&username, &password).await?;
            println!("signed in as {} ({})", user.username, user.id);
        }
        Command::Register(args) => {
            let request = RegisterRequest {
                username: args.username,
                email: args.email,
                confirm_password: args.password.clone(),
                password: args.password,
                first_name: args.first_name,
                last_name: args.last_name,
                phone: args.phone,
                avatar_url: None,
                settings: UserSettings { notifications: true, theme: client.tokens().theme() },
            };
            let user = client.session().register(&request).await?;
            if client.tokens().is_authenticated() {
                println!("registered and signed in as {} ({})", user.username, user.id);
            } else {
                println!("registered {} ({}); run `chatter login` to sign in", user.username, user.id);
            }
        }
        Command::Logout => {
            client.session().logout()?;
            println!("signed out");
        }
        Command::Whoami => {
            let user = require_user(&client).await?;
            print_user(&user);
        }
        Command::Conversations { search, page, page_size } => {
            require_user(&client).await?;
            let listing = match search.as_deref().filter(|s| !s.is_empty()) {
                Some(query) => client.api().search_conversations(query).await?,
                None => client.api().conversations(page, page_size).await?,
            };
            for conversation in &listing.results {
                print_conversation(conversation);
            }
            if listing.has_more() {
                println!("-- page {}/{} --", listing.current_page, listing.total_pages);
            }
        }
        Command::Messages { conversation, page, page_size } => {
            require_user(&client).await?;
            let listing = client.api().messages(conversation, page, page_size).await?;
            for message in &listing.results {
                print_message(message);
            }
        }
        Command::Send { conversation, text } => {
            require_user(&client).await?;
            let message = client.api().send_text(conversation, &text).await?;
            print_message(&message);
        }
        Command::Contacts { search, page } => {
            let me = require_user(&client).await?;
            let query = UserQuery { page: Some(page), page_size: Some(PAGE_SIZE), search };
            let listing = client.api().users(&query).await?;
            for user in listing.results.iter().filter(|u| u.id != me.id) {
                print_user(user);
            }
        }
        Command::Dm { username } => {
            let me = require_user(&client).await?;
            let query = UserQuery { search: Some(username.clone()), ..Default::default() };
            let listing = client.api().users(&query).await?;
            let other = listing
                .results
                .into_iter()
                .find(|u| u.username == username)
                .ok_or_else(|| anyhow::anyhow!("no user named {username}"))?;
            let conversation = client.api().open_direct(me.id, &other).await?;
            print_conversation(&conversation);
        }
        Command::Watch { conversation } => {
            watch(&client, conversation).await?;
        }
        Command::Theme { mode } => {
            let tokens = client.tokens();
            let theme = match mode.as_deref() {
                None => tokens.theme(),
                Some("toggle") => tokens.toggle_theme()?,
                Some(other) => {
                    let mode: ThemeMode = other.parse()?;
                    tokens.set_theme(mode)?;
                    mode
                }
            };
            println!("theme: {theme}");
        }
    }
    Ok(())
}

/// Restore the stored session or fail with a hint to log in.
async fn require_user(client: &Client) -> anyhow::Result<User> {
    client
        .session()
        .restore()
        .await
        .ok_or_else(|| anyhow::anyhow!("not signed in; run `chatter login`"))
}

async fn watch(client: &Client, conversation: Option<i64>) -> anyhow::Result<()> {
    let follower = client.follow_session();
    let me = require_user(client).await?;
    info!(user = %me.username, "watching");

    let tracker = Arc::new(Mutex::new(conversation.map(|id| TypingTracker::new(id, Some(me.id)))));

    let _messages = client.bus().on(EventKind::Message, move |event| {
        if let ChatEvent::Message(message) = event {
            if conversation.is_none_or(|id| id == message.conversation) {
                print_message(message);
            }
        }
    });
    let typing_view = Arc::clone(&tracker);
    let _typing = client.bus().on(EventKind::Typing, move |event| {
        if let ChatEvent::Typing(note) = event {
            if let Some(tracker) = typing_view.lock().as_mut() {
                if tracker.apply(note) {
                    match tracker.indicator() {
                        Some(text) => println!("   {text}"),
                        None => println!("   (nobody is typing)"),
                    }
                }
            }
        }
    });
    let _connection = client.bus().on(EventKind::Connection, |event| {
        if let ChatEvent::Connection { state, close_code } = event {
            match close_code {
                Some(code) => println!("[{state}: {code}]"),
                None => println!("[{state}]"),
            }
        }
    });

    let mut session_events = client.bus().subscribe();
    let notifier = conversation.map(|id| TypingNotifier::for_socket(Arc::clone(client.socket()), id));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = session_events.recv() => {
                if let Ok(ChatEvent::Session(SessionEvent::LoginRequired { reason })) = event {
                    println!("session expired ({reason}); run `chatter login`");
                    break;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let (Some(id), Some(notifier)) = (conversation, notifier.as_ref()) else {
                    continue;
                };
                let text = line.trim();
                if text.is_empty() {
                    notifier.keystroke();
                    continue;
                }
                notifier.keystroke();
                let sent = client.api().send_text(id, text).await;
                notifier.stop();
                if let Err(e) = sent {
                    println!("! {e}");
                }
            }
        }
    }

    client.socket().disconnect();
    follower.abort();
    Ok(())
}

async fn read_line(prompt: &str) -> anyhow::Result<String> {
    eprint!("{prompt}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let line = lines.next_line().await?.unwrap_or_default();
    Ok(line.trim_end().to_owned())
}

fn print_user(user: &User) {
    let presence = if user.is_online() { "online" } else { "offline" };
    println!("{:>6}  {:<20} {:<28} {presence}", user.id, user.username, user.display_name());
}

fn print_conversation(conversation: &Conversation) {
    let members: Vec<&str> =
        conversation.participants.iter().map(|p| p.user.username.as_str()).collect();
    println!(
        "{:>6}  {:<30} [{}] {}",
        conversation.id,
        conversation.title,
        conversation.kind.as_str(),
        members.join(", ")
    );
}

fn print_message(message: &Message) {
    let sender = message.sender.as_ref().map_or("?", |u| u.username.as_str());
    println!("[{}] #{} {sender}: {}", message.created_at, message.conversation, message.content);
}
