//! # tenpo
//!
//! A chat moderation bot that keeps channels speaking toki pona.
//!
//! Messages are cleaned, tokenized and scored against a ladder of
//! validators, from dictionary lookup down to plain alphabet checks.
//! Guilds and users decide where, when and how the bot responds.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tenpo::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let classifier = Classifier::new(Dictionary::builtin(40.0)?)?;
//!
//!     assert!(classifier.is_toki_pona("mi olin e sina"));
//!     assert!(!classifier.is_valid("hello there", 0.9, Tier::Loose)?);
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod classifier;
pub mod config;
pub mod moderation;
pub mod platforms;
pub mod rules;
pub mod store;
pub mod types;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::{EditOutcome, TenpoBot};
    pub use crate::classifier::{
        Classifier, ClassifierBuilder, ClassifierError, CleanOptions, Dictionary, DictionarySource, Threshold, Tier,
    };
    pub use crate::config::BotConfiguration;
    pub use crate::moderation::{ModerationOutcome, Moderator};
    pub use crate::platforms::{
        console::{ConsoleConfig, ConsolePlatform},
        PlatformConnection, PlatformError, PlatformEvent,
    };
    pub use crate::rules::{Gate, RuleSet, Timing};
    pub use crate::store::{ConfigStore, EntityConfig, MemoryStore};
    pub use crate::types::{ChatMessage, Container, Owner, ResponseStrategy};
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
