//! Chat command - Interactive assistant session in the terminal.
//!
//! Stands in for the portal's chat widget: stdin lines become intents and
//! every view model change is rendered as transcript lines.

use std::path::Path;

use anyhow::Result;
use chrono::Local;
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use portal_assistant::{
    ChannelState, Identity, KeyEvent, Message, MessageId, Role, Sender, SessionRuntime, ViewModel,
};

use super::ConfigOverrides;

#[derive(Args)]
pub struct ChatArgs {
    /// Role to chat as (student, parent, faculty, admin)
    #[arg(short, long)]
    role: Role,

    /// Stable user id; conversations are stored per role and user id
    #[arg(short, long)]
    user_id: Option<String>,

    /// Display name used in the welcome message
    #[arg(short, long, default_value = "there")]
    name: String,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

pub async fn execute(args: ChatArgs, config_file: Option<&Path>) -> Result<()> {
    let config = args.overrides.resolve(config_file)?;
    let identity = Identity::new(args.role, args.user_id.as_deref(), args.name);

    info!(
        "Starting assistant session for {} ({})",
        identity.user_id,
        identity.role
    );
    println!("💬 Campus assistant ({}) - type /help for commands", config.endpoint);

    let runtime = SessionRuntime::new(config);
    let mut handle = runtime.mount(identity);
    handle.open()?;

    let mut transcript = Transcript::default();
    print_lines(transcript.render(&handle.view()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let input = ShellInput::parse(&line);
                match input {
                    ShellInput::Quit => break,
                    ShellInput::Empty => {}
                    ShellInput::Help => print_help(),
                    ShellInput::Message(text) => handle.send_user_message(text)?,
                    ShellInput::Open => handle.open()?,
                    ShellInput::Close => handle.close()?,
                    ShellInput::Clear => handle.clear_history()?,
                    ShellInput::Escape => handle.key(KeyEvent::escape())?,
                    ShellInput::Toggle => handle.key(KeyEvent::ctrl('/'))?,
                    ShellInput::Reconnect => handle.reconnect()?,
                    ShellInput::Quick(n) => {
                        let actions = handle.view().quick_actions;
                        match n.checked_sub(1).and_then(|i| actions.get(i)) {
                            Some(prompt) => handle.send_quick_action(prompt.clone())?,
                            None => println!("⚠️  No quick action #{} right now", n),
                        }
                    }
                    ShellInput::Unknown(command) => {
                        println!("⚠️  Unknown command: {}", command);
                        print_help();
                    }
                }
            }
            view = handle.changed() => match view {
                Ok(view) => print_lines(transcript.render(&view)),
                Err(_) => break,
            },
        }
    }

    handle.unmount().await;
    println!("👋 Session closed");
    Ok(())
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /open, /close   show or hide the widget");
    println!("  /quick <n>      send the n-th quick action");
    println!("  /clear          clear conversation history");
    println!("  /esc            press Escape");
    println!("  /toggle         press Ctrl+/");
    println!("  /reconnect      reconnect a closed live channel");
    println!("  /quit           end the session");
}

/// One line of shell input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellInput {
    Message(String),
    Open,
    Close,
    Quick(usize),
    Clear,
    Escape,
    Toggle,
    Reconnect,
    Quit,
    Help,
    Empty,
    Unknown(String),
}

impl ShellInput {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if !trimmed.starts_with('/') {
            return Self::Message(line.to_string());
        }

        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::trim);

        match (command, arg) {
            ("/open", None) => Self::Open,
            ("/close", None) => Self::Close,
            ("/clear", None) => Self::Clear,
            ("/esc", None) => Self::Escape,
            ("/toggle", None) => Self::Toggle,
            ("/reconnect", None) => Self::Reconnect,
            ("/quit" | "/exit", None) => Self::Quit,
            ("/help", None) => Self::Help,
            ("/quick", Some(n)) => n
                .parse()
                .map(Self::Quick)
                .unwrap_or_else(|_| Self::Unknown(trimmed.to_string())),
            _ => Self::Unknown(trimmed.to_string()),
        }
    }
}

/// Turns successive view models into the lines that changed
#[derive(Default)]
pub struct Transcript {
    printed: Vec<MessageId>,
    last: Option<ViewModel>,
}

impl Transcript {
    pub fn render(&mut self, view: &ViewModel) -> Vec<String> {
        let mut lines = Vec::new();
        let previous = self.last.take();

        if previous.as_ref().map(|p| p.channel_state) != Some(view.channel_state) {
            lines.push(format!("[live channel {}]", channel_label(view.channel_state)));
        }
        if let Some(prev) = &previous {
            if prev.is_open != view.is_open {
                lines.push(if view.is_open { "[widget opened]" } else { "[widget closed]" }.to_string());
            }
        }

        let ids: Vec<MessageId> = view.messages.iter().map(|m| m.id).collect();
        let reset = !ids.starts_with(&self.printed);
        if reset {
            lines.push("[conversation reset]".to_string());
            self.printed.clear();
        }
        for message in &view.messages[self.printed.len()..] {
            lines.push(format_message(message));
        }
        self.printed = ids;

        let was_composing = previous.as_ref().is_some_and(|p| p.is_composing);
        if view.is_composing && !was_composing {
            lines.push("  assistant is typing...".to_string());
        }

        let menu_changed = previous
            .as_ref()
            .map_or(true, |p| p.quick_actions != view.quick_actions);
        if !view.quick_actions.is_empty() && (menu_changed || reset) {
            lines.push("Quick actions:".to_string());
            for (index, action) in view.quick_actions.iter().enumerate() {
                lines.push(format!("  /quick {}  {}", index + 1, action));
            }
        }

        self.last = Some(view.clone());
        lines
    }
}

fn channel_label(state: ChannelState) -> &'static str {
    match state {
        ChannelState::Connecting => "connecting",
        ChannelState::Open => "open",
        ChannelState::Closed => "closed",
    }
}

fn format_message(message: &Message) -> String {
    let who = match message.sender {
        Sender::User => "You",
        Sender::Assistant => "Assistant",
        Sender::System => "System",
    };
    format!(
        "[{}] {}: {}",
        message.timestamp.with_timezone(&Local).format("%H:%M:%S"),
        who,
        message.text
    )
}
