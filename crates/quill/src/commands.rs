//! Quill command implementations

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use quill_agent::Conversation;
use quill_config::{self, Config, API_KEY_ENV};
use quill_memory::FileMemory;
use quill_provider::{OpenAiProvider, Provider, Role};

pub async fn init_command() -> Result<()> {
    println!("Initializing Quill...");

    let config = quill_config::init()
        .await
        .context("Failed to initialize config")?;

    println!("Config:   {}", quill_config::config_path().display());
    println!("Sessions: {}", config.storage_dir().display());
    println!("\nNext steps:");
    println!("  1. Set {} or add an API key to the config file", API_KEY_ENV);
    println!("  2. Start chatting: quill chat -m \"Hello!\"");

    Ok(())
}

fn build_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    let api_key = config.api_key().with_context(|| {
        format!(
            "No API key configured. Set {} or add one to {}",
            API_KEY_ENV,
            quill_config::config_path().display()
        )
    })?;

    let provider = OpenAiProvider::new(api_key, config.api_base(), Some(config.model_name()))
        .context("Failed to create model client")?
        .with_timeout(Duration::from_secs(config.model.timeout_secs))
        .context("Failed to create model client")?
        .with_max_retries(config.model.max_retries);

    debug!("model endpoint: {}", provider.api_base());
    Ok(Arc::new(provider))
}

/// Chat with the agent
pub async fn chat_command(message: Option<String>, session: Option<String>) -> Result<()> {
    let config = Config::load().await.context("Failed to load config")?;
    let provider = build_provider(&config)?;

    let mut conversation = Conversation::from_config(provider, &config);
    if let Some(session) = session {
        conversation = conversation.with_session_id(session);
    }

    if config.memory.enabled {
        let restored = conversation
            .restore()
            .await
            .context("Failed to restore session")?;
        info!("session {}: {} earlier messages", conversation.session_id(), restored);
    }

    if let Some(msg) = message {
        let reply = conversation.submit(&msg).await;
        println!("{}", reply);
        return Ok(());
    }

    println!("Interactive mode (type 'exit' to quit)");
    println!("Session: {}", conversation.session_id());

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        let reply = conversation.submit(input).await;
        println!("\n{}\n", reply);
    }

    Ok(())
}

/// Print, list or delete stored sessions
pub async fn history_command(session: Option<String>, clear: bool) -> Result<()> {
    let config = Config::load().await.context("Failed to load config")?;
    let memory = FileMemory::from_config(&config);

    let Some(session) = session else {
        let sessions = memory.list().await;
        if sessions.is_empty() {
            println!("No stored sessions in {}", memory.dir().display());
        } else {
            for id in sessions {
                println!("{}", id);
            }
        }
        return Ok(());
    };

    if clear {
        if memory.delete(&session).await? {
            println!("Deleted session {}", session);
        } else {
            println!("Session {} not found", session);
        }
        return Ok(());
    }

    let transcript = memory
        .transcript(&session)
        .await
        .with_context(|| format!("No stored session named {}", session))?;

    println!(
        "Session {} (started {})",
        transcript.session_id,
        transcript.created_at.format("%Y-%m-%d %H:%M")
    );
    for stored in &transcript.messages {
        let message = &stored.message;
        let label = match (message.role, message.name.as_deref()) {
            (Role::Tool, Some(name)) => format!("tool:{}", name),
            (role, _) => role.to_string(),
        };
        let text = if message.text().is_empty() {
            let ids = message.tool_call_ids();
            format!("[tool calls: {}]", ids.join(", "))
        } else {
            message.text().to_string()
        };
        println!(
            "[{}] {}: {}",
            stored.timestamp.format("%H:%M:%S"),
            label,
            text
        );
    }

    Ok(())
}

/// Show configuration status
pub async fn status_command() -> Result<()> {
    let config_path = quill_config::config_path();

    println!("Quill Status");
    println!(
        "Config:     {} {}",
        config_path.display(),
        if config_path.exists() {
            "[OK]"
        } else {
            "[Missing]"
        }
    );

    let config = Config::load().await.context("Failed to load config")?;
    println!("Model:      {}", config.model_name());
    println!(
        "API Key:    {}",
        if config.has_api_key() {
            "[Set]"
        } else {
            "[Missing]"
        }
    );
    println!("Iterations: {}", config.max_iterations());
    println!(
        "Story tool: {}",
        if config.toolkit.continue_story {
            "[Enabled]"
        } else {
            "[Disabled]"
        }
    );
    println!(
        "Memory:     {} ({}, threshold {} messages)",
        if config.memory.enabled {
            "[Enabled]"
        } else {
            "[Disabled]"
        },
        config.storage_dir().display(),
        config.memory.max_messages
    );

    Ok(())
}
