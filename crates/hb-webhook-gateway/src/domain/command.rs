//! Command grammar for messages addressed to the bot.
//!
//! ```text
//! <trigger> <keyword> [<include_marker> a, b, ...] [<exclude_marker> x, y, ...]
//! ```
//!
//! Only the recipe directive exists. Everything else is `Unrecognized`.
//!
//! The command is the text between the first mention of the bot and the
//! next one. Ingredients stop at the exclude marker; exclusions run to the
//! end of the command.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Structured command extracted from a text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    /// Recipe request with ingredient and tag filters
    RecipeRequest {
        requester: String,
        included: BTreeSet<String>,
        excluded: BTreeSet<String>,
    },
    /// No trigger, or a directive other than the recipe keyword
    Unrecognized,
}

/// Markers that delimit a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandGrammar {
    /// Mention of the bot, e.g. `@HealthBot`
    pub trigger: String,
    /// Directive keyword following the trigger
    pub keyword: String,
    /// Starts the ingredient list
    pub include_marker: String,
    /// Starts the excluded-tag list
    pub exclude_marker: String,
}

impl Default for CommandGrammar {
    fn default() -> Self {
        Self {
            trigger: "@HealthBot".to_string(),
            keyword: "recipe".to_string(),
            include_marker: "ingredients:".to_string(),
            exclude_marker: "exclude:".to_string(),
        }
    }
}

impl CommandGrammar {
    /// Markers used by the Chinese-language deployment.
    pub fn chinese() -> Self {
        Self {
            trigger: "@健康助手".to_string(),
            keyword: "食谱".to_string(),
            include_marker: "食材:".to_string(),
            exclude_marker: "排除:".to_string(),
        }
    }

    /// True when the text mentions the bot at all.
    pub fn is_addressed(&self, text: &str) -> bool {
        text.contains(&self.trigger)
    }

    /// Extract a command from a message sent by `sender`.
    pub fn parse(&self, sender: &str, text: &str) -> ParsedCommand {
        let Some(command) = text.split(self.trigger.as_str()).nth(1) else {
            return ParsedCommand::Unrecognized;
        };

        let command = command.trim();
        if !command.starts_with(self.keyword.as_str()) {
            return ParsedCommand::Unrecognized;
        }

        let included = command
            .split_once(self.include_marker.as_str())
            .map(|(_, rest)| {
                rest.split_once(self.exclude_marker.as_str())
                    .map_or(rest, |(head, _)| head)
            })
            .map(split_tokens)
            .unwrap_or_default();
        let excluded = command
            .split_once(self.exclude_marker.as_str())
            .map(|(_, rest)| split_tokens(rest))
            .unwrap_or_default();

        ParsedCommand::RecipeRequest {
            requester: sender.to_string(),
            included,
            excluded,
        }
    }
}

fn split_tokens(segment: &str) -> BTreeSet<String> {
    segment
        .split([',', '，'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
