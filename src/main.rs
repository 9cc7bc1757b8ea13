//! docs-chat - terminal client for the documentation assistant
//!
//! Streams answers from the chat service into the terminal, keeping the
//! session id on disk between runs.

use docs_chat::conversation::{Message, MessageId};
use docs_chat::runtime::WidgetUpdate;
use docs_chat::session::{MemoryStore, SessionManager, SqliteStore};
use docs_chat::{ChatConfig, HttpTransport, WidgetRuntime};
use reqwest::Url;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "\
Commands:
  /select <text>  attach selected documentation text to the next question
  /cancel         stop the answer being streamed
  /clear          forget the conversation and start a new session
  /toggle         toggle the widget between minimized and expanded
  /dismiss        dismiss the current error
  /health         check the chat service
  /quit           exit
Anything else is sent as a question.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they never interleave with streamed answers
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docs_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Configuration
    let config = ChatConfig::from_env();
    let state_path = std::env::var("DOCS_CHAT_STATE_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.docs-chat/state.db")
    });

    if let Some(parent) = PathBuf::from(&state_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %state_path, api_url = %config.api_url, "Starting docs-chat");
    let durable = Arc::new(SqliteStore::open(&state_path)?);
    let explicit_id = std::env::var("DOCS_CHAT_SESSION_ID").ok();
    let session = SessionManager::new(
        durable,
        Arc::new(MemoryStore::new()),
        explicit_id.as_deref(),
    );

    let transport = HttpTransport::new(&config)?;
    let (widget, updates) = WidgetRuntime::spawn(&config, transport.clone(), session);

    let docs_base = config
        .docs_url
        .as_deref()
        .and_then(|url| Url::parse(url).ok());
    // Attached selection, kept until the widget reports it was sent
    let selection: Arc<Mutex<Option<String>>> = Arc::default();
    tokio::spawn(render(updates, Renderer::new(docs_base), selection.clone()));

    println!("Ask a question about the documentation. /help lists commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, argument) = line.split_once(' ').unwrap_or((line, ""));

        match command {
            "" => {}
            "/quit" | "/exit" => break,
            "/help" => println!("{HELP}"),
            "/select" => match config.accept_selection(argument) {
                Some(text) => {
                    println!("[selection attached]");
                    *selection.lock().await = Some(text);
                }
                None => println!(
                    "[selection must be {} to {} characters]",
                    config.min_selection_length, config.max_selection_length
                ),
            },
            "/cancel" => widget.cancel().await?,
            "/clear" => widget.clear().await?,
            "/toggle" => widget.toggle().await?,
            "/dismiss" => widget.dismiss_error().await?,
            "/health" => match transport.health().await {
                Ok(report) => {
                    println!("[service {}]", report.status);
                    for (name, service) in &report.services {
                        match &service.message {
                            Some(message) => println!("  {name}: {} ({message})", service.status),
                            None => println!("  {name}: {}", service.status),
                        }
                    }
                }
                Err(e) => println!("[health check failed: {e}]"),
            },
            _ => {
                let attached = selection.lock().await.clone();
                widget.submit(line, attached).await?;
            }
        }
    }

    Ok(())
}

/// Prints conversation snapshots incrementally
struct Renderer {
    docs_base: Option<Url>,
    /// Highest message id fully printed
    rendered_up_to: MessageId,
    /// Assistant message being printed and the bytes printed so far
    streaming: Option<(MessageId, usize)>,
    seen_history: bool,
}

impl Renderer {
    fn new(docs_base: Option<Url>) -> Self {
        Self {
            docs_base,
            rendered_up_to: 0,
            streaming: None,
            seen_history: false,
        }
    }

    fn conversation(&mut self, messages: &[Message], turn_streaming: bool) {
        if !self.seen_history {
            self.seen_history = true;
            for message in messages {
                self.print_whole(message);
            }
            self.rendered_up_to = messages.last().map_or(0, |m| m.id);
            return;
        }

        let floor = self.rendered_up_to;
        for message in messages.iter().filter(|m| m.id > floor) {
            if message.is_user() {
                continue;
            }

            let printed = match self.streaming {
                Some((id, printed)) if id == message.id => printed,
                _ => {
                    print!("assistant> ");
                    0
                }
            };
            if let Some(suffix) = message.content.get(printed..) {
                print!("{suffix}");
            }
            self.streaming = Some((message.id, message.content.len()));

            if !message.streaming {
                println!();
                self.print_citations(message);
                self.rendered_up_to = message.id;
                self.streaming = None;
            }
        }

        // The in-flight answer was removed by a cancel or an error
        if !turn_streaming {
            if let Some((id, _)) = self.streaming.take() {
                println!(" [stopped]");
                self.rendered_up_to = id;
            }
            if let Some(last) = messages.last() {
                self.rendered_up_to = self.rendered_up_to.max(last.id);
            }
        }
        let _ = std::io::stdout().flush();
    }

    fn print_whole(&self, message: &Message) {
        if message.is_user() {
            println!("you> {}", message.content);
        } else {
            println!("assistant> {}", message.content);
            self.print_citations(message);
        }
    }

    fn print_citations(&self, message: &Message) {
        for (index, citation) in message.citations.iter().enumerate() {
            let target = self
                .docs_base
                .as_ref()
                .and_then(|base| citation.resolve(base))
                .map_or_else(|| citation.locator.clone(), |url| url.to_string());
            println!(
                "  [{}] {} / {} ({target})",
                index + 1,
                citation.chapter,
                citation.display_text()
            );
        }
    }

    fn cleared(&mut self) {
        self.rendered_up_to = 0;
        self.streaming = None;
    }
}

async fn render(
    mut updates: broadcast::Receiver<WidgetUpdate>,
    mut renderer: Renderer,
    selection: Arc<Mutex<Option<String>>>,
) {
    loop {
        match updates.recv().await {
            Ok(WidgetUpdate::Conversation {
                messages,
                streaming,
            }) => renderer.conversation(&messages, streaming),
            Ok(WidgetUpdate::Visibility(visibility)) => println!("[widget {visibility}]"),
            Ok(WidgetUpdate::Error(Some(error))) => println!("[error: {error}]"),
            Ok(WidgetUpdate::Error(None)) => {}
            Ok(WidgetUpdate::SelectionConsumed) => {
                tracing::debug!("Selection sent");
                selection.lock().await.take();
            }
            Ok(WidgetUpdate::Rejected(reason)) => {
                println!("[not sent: {reason}]");
            }
            Ok(WidgetUpdate::SessionChanged { session_id }) => {
                renderer.cleared();
                println!("[new session {session_id}]");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Renderer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docs_chat::Conversation;

    #[test]
    fn test_renderer_tracks_finished_answers() {
        let mut renderer = Renderer::new(None);
        renderer.conversation(&[], false);

        let mut conversation = Conversation::new();
        conversation.push_user("What is ROS 2?", None, Utc::now());
        let answer = conversation.push_placeholder(Utc::now());
        conversation.append_token(answer, "Middle");
        renderer.conversation(conversation.messages(), true);
        assert_eq!(renderer.streaming, Some((answer, "Middle".len())));
        assert_eq!(renderer.rendered_up_to, 0);

        conversation.append_token(answer, "ware.");
        conversation.finalize(answer);
        renderer.conversation(conversation.messages(), false);
        assert_eq!(renderer.streaming, None);
        assert_eq!(renderer.rendered_up_to, answer);
    }
}
