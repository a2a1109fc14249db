//! chatgate smoke client.
//!
//! Signs in against `CHATGATE_API_URL`, creates a chat, posts one message
//! through the sync cache and signs out again. Useful for checking a
//! deployment end to end.

use chatgate::config::SessionConfig;
use chatgate::models::{Operation, RecordKind};
use chatgate::{logging, ChatSession};

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use serde_json::json;
use std::io::{self, BufRead, Write};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    if std::env::args().any(|arg| arg == "--version") {
        println!("chatgate {}", VERSION);
        return Ok(());
    }

    color_eyre::install()?;
    logging::init();

    let config = SessionConfig::from_env();
    let username = match std::env::var("CHATGATE_USERNAME") {
        Ok(name) if !name.trim().is_empty() => name,
        _ => prompt("Username: ")?,
    };
    let password = rpassword::prompt_password("Password: ").wrap_err("Failed to read password")?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(config, &username, &password))
}

async fn run(config: SessionConfig, username: &str, password: &str) -> Result<()> {
    let session = ChatSession::from_config(config)?;

    session
        .login(username, password)
        .await
        .map_err(|e| eyre!(e.user_message()).wrap_err("Login failed"))?;
    session.start_proactive_refresh();

    let result = exercise(&session).await;

    session.stop_proactive_refresh();
    session.logout().await?;
    result
}

async fn exercise(session: &ChatSession) -> Result<()> {
    let cache = session.cache();

    let chat = cache
        .create(RecordKind::Chat, json!({ "title": "chatgate smoke test" }))
        .await
        .wrap_err("Failed to create chat")?;
    println!("Created chat {}", chat.id);

    let outcome = cache
        .act(
            RecordKind::Chat,
            &chat.id,
            Operation::SendMessage,
            Some(json!({ "role": "user", "content": "hello from chatgate" })),
        )
        .await
        .wrap_err("Failed to send message")?;

    match outcome.record() {
        Some(message) => println!(
            "Sent message {} at {}",
            message.id,
            message.updated_at.to_rfc3339()
        ),
        None => println!("Message sent"),
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
