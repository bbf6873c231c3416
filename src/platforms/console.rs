// src/platforms/console.rs - Line-oriented platform over stdin/stdout
//
// Every input line is a message in one guild channel. Commands:
//   /user <id>                    switch the author of following lines
//   /edit <id> <text>             edit an earlier message
//   /rule <guild|user> [except]   toggle a rule for the console channel
//   /everywhere <on|off>          check the current author in every channel

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, RwLock};

use crate::platforms::{OutgoingMessage, PlatformConnection, PlatformError, PlatformEvent, PlatformResult};
use crate::store::ConfigStore;
use crate::types::{ChatMessage, Container, Owner};

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub guild_id: u64,
    pub channel_id: u64,
    pub author_id: u64,
    /// Messages remembered for edits and reactions
    pub history: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            guild_id: 1,
            channel_id: 1,
            author_id: 1,
            history: 1000,
        }
    }
}

#[derive(Debug, Default)]
struct ConsoleState {
    messages: HashMap<u64, ChatMessage>,
    /// Message id -> emoji the bot has reacted with
    reactions: HashMap<u64, Vec<String>>,
    /// Oldest first
    order: VecDeque<u64>,
    author_id: u64,
}

impl ConsoleState {
    fn remember(&mut self, message: ChatMessage, history: usize) {
        self.order.push_back(message.id);
        self.messages.insert(message.id, message);
        while self.order.len() > history.max(1) {
            if let Some(old) = self.order.pop_front() {
                self.messages.remove(&old);
                self.reactions.remove(&old);
            }
        }
    }
}

/// Parsed input line
#[derive(Debug, PartialEq, Eq)]
enum ConsoleInput<'a> {
    Message(&'a str),
    SwitchUser(u64),
    Edit(u64, &'a str),
    Rule { owner: Owner, exception: bool },
    Everywhere(bool),
    Invalid(&'a str),
}

fn parse_line(line: &str) -> ConsoleInput<'_> {
    if let Some(rest) = line.strip_prefix("/user ") {
        return match rest.trim().parse() {
            Ok(id) => ConsoleInput::SwitchUser(id),
            Err(_) => ConsoleInput::Invalid(line),
        };
    }
    if let Some(rest) = line.strip_prefix("/edit ") {
        let (id, text) = rest.trim_start().split_once(' ').unwrap_or((rest.trim(), ""));
        return match id.parse() {
            Ok(id) => ConsoleInput::Edit(id, text),
            Err(_) => ConsoleInput::Invalid(line),
        };
    }
    if let Some(rest) = line.strip_prefix("/rule ") {
        let mut args = rest.split_whitespace();
        let owner = match args.next() {
            Some("guild") => Owner::Guild,
            Some("user") => Owner::User,
            _ => return ConsoleInput::Invalid(line),
        };
        return match (args.next(), args.next()) {
            (None, _) => ConsoleInput::Rule { owner, exception: false },
            (Some("except"), None) => ConsoleInput::Rule { owner, exception: true },
            _ => ConsoleInput::Invalid(line),
        };
    }
    if let Some(rest) = line.strip_prefix("/everywhere ") {
        return match rest.trim() {
            "on" => ConsoleInput::Everywhere(true),
            "off" => ConsoleInput::Everywhere(false),
            _ => ConsoleInput::Invalid(line),
        };
    }
    ConsoleInput::Message(line)
}

pub struct ConsolePlatform {
    config: ConsoleConfig,
    /// Target of the settings commands
    store: Option<Arc<dyn ConfigStore>>,
    /// Taken by the reader at end of input so receivers see the stream close
    event_sender: Arc<Mutex<Option<broadcast::Sender<PlatformEvent>>>>,
    state: Arc<RwLock<ConsoleState>>,
    next_id: Arc<AtomicU64>,
    is_connected: Arc<RwLock<bool>>,
}

impl ConsolePlatform {
    pub fn new(config: ConsoleConfig) -> Self {
        let state = ConsoleState {
            author_id: config.author_id,
            ..Default::default()
        };
        Self {
            config,
            store: None,
            event_sender: Arc::new(Mutex::new(None)),
            state: Arc::new(RwLock::new(state)),
            next_id: Arc::new(AtomicU64::new(1)),
            is_connected: Arc::new(RwLock::new(false)),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Check the console channel for the guild unless its rules were already
    /// set up, so a fresh run moderates out of the box
    pub async fn seed_rules(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let guild = store.entity(Owner::Guild, self.config.guild_id).await?;
        if guild.rules.is_empty() && !guild.rules.everywhere() {
            store
                .toggle_rule(Owner::Guild, self.config.guild_id, self.config.channel_id, Container::Channel, false)
                .await?;
            info!("Checking console channel {} for guild {}", self.config.channel_id, self.config.guild_id);
        }
        Ok(())
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Turn one input line into an event, updating the message log
    async fn ingest(
        line: &str,
        config: &ConsoleConfig,
        store: Option<&dyn ConfigStore>,
        state: &RwLock<ConsoleState>,
        next_id: &AtomicU64,
    ) -> Option<PlatformEvent> {
        let mut state = state.write().await;
        match parse_line(line) {
            ConsoleInput::Message(text) => {
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                let message = ChatMessage::new(id, state.author_id, config.guild_id, config.channel_id, text);
                println!("#{} <user{}> {}", id, state.author_id, text);
                state.remember(message.clone(), config.history);
                Some(PlatformEvent::MessageCreated(message))
            }
            ConsoleInput::SwitchUser(id) => {
                state.author_id = id;
                println!("now speaking as user{}", id);
                None
            }
            ConsoleInput::Edit(id, text) => {
                let Some(before) = state.messages.get(&id).cloned() else {
                    println!("no message #{}", id);
                    return None;
                };
                let mut after = before.clone();
                after.content = text.to_string();
                state.messages.insert(id, after.clone());
                println!("#{} (edited) {}", id, text);
                Some(PlatformEvent::MessageEdited {
                    before: Some(before),
                    after,
                })
            }
            ConsoleInput::Rule { owner, exception } => {
                let Some(store) = store else {
                    println!("no settings store attached");
                    return None;
                };
                let id = match owner {
                    Owner::Guild => config.guild_id,
                    Owner::User => state.author_id,
                };
                match store
                    .toggle_rule(owner, id, config.channel_id, Container::Channel, exception)
                    .await
                {
                    Ok(action) => println!("{:?} channel rule for {:?} {}", action, owner, id),
                    Err(e) => warn!("Failed to toggle rule: {:#}", e),
                }
                None
            }
            ConsoleInput::Everywhere(everywhere) => {
                let Some(store) = store else {
                    println!("no settings store attached");
                    return None;
                };
                match store.set_everywhere(Owner::User, state.author_id, everywhere).await {
                    Ok(()) => println!("user{} checked everywhere: {}", state.author_id, everywhere),
                    Err(e) => warn!("Failed to set everywhere: {:#}", e),
                }
                None
            }
            ConsoleInput::Invalid(line) => {
                println!("could not parse command: {}", line);
                None
            }
        }
    }
}

#[async_trait]
impl PlatformConnection for ConsolePlatform {
    async fn connect(&mut self) -> Result<()> {
        let (tx, _) = broadcast::channel(1000);
        *self.event_sender.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        *self.is_connected.write().await = true;

        let event_sender = Arc::clone(&self.event_sender);
        let state = Arc::clone(&self.state);
        let next_id = Arc::clone(&self.next_id);
        let is_connected = Arc::clone(&self.is_connected);
        let config = self.config.clone();
        let store = self.store.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            info!("Console reader started");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        let Some(event) = ConsolePlatform::ingest(&line, &config, store.as_deref(), &state, &next_id).await
                        else {
                            continue;
                        };
                        let sender = event_sender.lock().unwrap_or_else(PoisonError::into_inner).clone();
                        if let Some(sender) = sender {
                            if let Err(e) = sender.send(event) {
                                warn!("Failed to broadcast event: {}", e);
                            }
                        }
                    }
                    Ok(None) => {
                        debug!("End of console input");
                        break;
                    }
                    Err(e) => {
                        warn!("Console read error: {}", e);
                        break;
                    }
                }
            }

            event_sender.lock().unwrap_or_else(PoisonError::into_inner).take();
            *is_connected.write().await = false;
            info!("Console reader exited");
        });

        info!("Console platform ready; one message per line");
        Ok(())
    }

    fn platform_name(&self) -> &str {
        "console"
    }

    async fn is_connected(&self) -> bool {
        *self.is_connected.read().await
    }

    fn get_event_receiver(&self) -> Option<broadcast::Receiver<PlatformEvent>> {
        self.event_sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|sender| sender.subscribe())
    }

    async fn add_reaction(&self, message: &ChatMessage, emoji: &str) -> PlatformResult<()> {
        let mut state = self.state.write().await;
        if !state.messages.contains_key(&message.id) {
            return Err(PlatformError::NotFound(format!("message #{}", message.id)));
        }
        let reactions = state.reactions.entry(message.id).or_default();
        if !reactions.iter().any(|r| r == emoji) {
            reactions.push(emoji.to_string());
        }
        println!("#{} +{}", message.id, emoji);
        Ok(())
    }

    async fn remove_own_reaction(&self, message: &ChatMessage, emoji: &str) -> PlatformResult<()> {
        let mut state = self.state.write().await;
        let reactions = state
            .reactions
            .get_mut(&message.id)
            .ok_or_else(|| PlatformError::NotFound(format!("reaction on #{}", message.id)))?;
        reactions.retain(|r| r != emoji);
        println!("#{} -{}", message.id, emoji);
        Ok(())
    }

    async fn own_reactions(&self, message: &ChatMessage) -> PlatformResult<Vec<String>> {
        Ok(self.state.read().await.reactions.get(&message.id).cloned().unwrap_or_default())
    }

    async fn delete_message(&self, message: &ChatMessage) -> PlatformResult<()> {
        let mut state = self.state.write().await;
        if state.messages.remove(&message.id).is_none() {
            return Err(PlatformError::NotFound(format!("message #{}", message.id)));
        }
        state.reactions.remove(&message.id);
        println!("#{} deleted", message.id);
        Ok(())
    }

    async fn send_message(&self, message: OutgoingMessage) -> PlatformResult<u64> {
        if !*self.is_connected.read().await {
            return Err(PlatformError::Closed);
        }
        let id = self.allocate_id();
        let reply = message.reply_to.map(|r| format!(" (reply to #{})", r)).unwrap_or_default();
        println!("#{} <tenpo>{} {}", id, reply, message.content);
        Ok(id)
    }

    async fn send_direct_message(&self, user_id: u64, content: &str) -> PlatformResult<()> {
        println!("[dm to user{}] {}", user_id, content);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.event_sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        *self.is_connected.write().await = false;
        info!("Console platform disconnected");
        Ok(())
    }
}
