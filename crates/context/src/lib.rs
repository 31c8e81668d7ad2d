//! Context manager (C5): token accounting and history truncation.
//!
//! Token counting goes through a provider-agnostic [`TokenEncoder`]
//! abstraction; the only encoder shipped here is the character/4
//! fallback (spec §9's open question notes implementations may
//! substitute a better heuristic but must report which encoder they
//! used — see [`TokenStats::encoder_name`]).

use ra_domain::config::{ContextConfig, TruncationStrategy};
use ra_domain::tool::Message;

/// Small constant overhead counted per message, approximating the
/// per-turn framing tokens a real provider tokenizer would add.
const MESSAGE_OVERHEAD_TOKENS: usize = 4;
/// Additional overhead for a message carrying a name/identity tag.
const NAME_OVERHEAD_TOKENS: usize = 1;

pub trait TokenEncoder: Send + Sync {
    fn name(&self) -> &str;
    fn count(&self, text: &str) -> usize;
}

/// Character/4 fallback encoder, used when no provider-specific tokenizer
/// is available.
pub struct CharDiv4Encoder;

impl TokenEncoder for CharDiv4Encoder {
    fn name(&self) -> &str {
        "char/4"
    }
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Per-role token totals for a message sequence.
#[derive(Debug, Clone, Default)]
pub struct TokenStats {
    pub system_tokens: usize,
    pub user_tokens: usize,
    pub assistant_tokens: usize,
    pub tool_tokens: usize,
    pub total_tokens: usize,
    pub encoder_name: String,
}

pub struct ContextManager {
    encoder: Box<dyn TokenEncoder>,
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new(Box::new(CharDiv4Encoder))
    }
}

impl ContextManager {
    pub fn new(encoder: Box<dyn TokenEncoder>) -> Self {
        Self { encoder }
    }

    pub fn encoder_name(&self) -> &str {
        self.encoder.name()
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.encoder.count(text)
    }

    pub fn count_message_tokens(&self, message: &Message) -> usize {
        self.count_tokens(&message.content.extract_all_text())
            + MESSAGE_OVERHEAD_TOKENS
            + NAME_OVERHEAD_TOKENS
    }

    pub fn count_messages_tokens(&self, messages: &[Message]) -> TokenStats {
        use ra_domain::tool::Role;
        let mut stats = TokenStats {
            encoder_name: self.encoder_name().to_string(),
            ..Default::default()
        };
        for message in messages {
            let tokens = self.count_message_tokens(message);
            match message.role {
                Role::System => stats.system_tokens += tokens,
                Role::User => stats.user_tokens += tokens,
                Role::Assistant => stats.assistant_tokens += tokens,
                Role::Tool => stats.tool_tokens += tokens,
            }
            stats.total_tokens += tokens;
        }
        stats
    }

    pub fn get_available_tokens(&self, config: &ContextConfig, used_tokens: usize) -> usize {
        config
            .max_tokens
            .saturating_sub(config.reserve_tokens)
            .saturating_sub(used_tokens)
    }

    pub fn should_truncate(&self, config: &ContextConfig, used_tokens: usize, ratio: f64) -> bool {
        (used_tokens as f64) >= ratio * (config.max_tokens as f64)
    }

    /// Truncate `messages` to fit `config`, dispatching to the configured
    /// strategy. Order is always preserved.
    pub fn truncate_messages(&self, messages: &[Message], config: &ContextConfig) -> Vec<Message> {
        let budget = config.max_tokens.saturating_sub(config.reserve_tokens);
        match config.strategy {
            TruncationStrategy::Smart => self.truncate_smart(messages, config, budget),
            TruncationStrategy::Fifo => self.truncate_fifo(messages, budget),
            TruncationStrategy::Middle => self.truncate_middle(messages, config, budget),
        }
    }

    fn is_system(message: &Message) -> bool {
        matches!(message.role, ra_domain::tool::Role::System)
    }

    /// Keep the first `keep_system_messages` system messages and the last
    /// `keep_recent_messages`; pack as much of the most-recent middle as
    /// fits the remaining budget, preserving original order.
    fn truncate_smart(&self, messages: &[Message], config: &ContextConfig, budget: usize) -> Vec<Message> {
        if messages.is_empty() {
            return Vec::new();
        }
        let head: Vec<usize> = messages
            .iter()
            .enumerate()
            .filter(|(_, m)| Self::is_system(m))
            .map(|(i, _)| i)
            .take(config.keep_system_messages)
            .collect();

        let tail_count = config.keep_recent_messages.min(messages.len());
        let tail_start = messages.len() - tail_count;
        let tail: Vec<usize> = (tail_start..messages.len()).collect();

        let mut kept: std::collections::BTreeSet<usize> = head.iter().chain(tail.iter()).copied().collect();
        let mut used: usize = kept.iter().map(|&i| self.count_message_tokens(&messages[i])).sum();

        // Pack the middle, most-recent-first, until the budget is exhausted.
        let middle_candidates: Vec<usize> = (0..messages.len())
            .rev()
            .filter(|i| !kept.contains(i))
            .collect();
        for idx in middle_candidates {
            let cost = self.count_message_tokens(&messages[idx]);
            if used + cost > budget {
                continue;
            }
            kept.insert(idx);
            used += cost;
        }

        kept.into_iter().map(|i| messages[i].clone()).collect()
    }

    /// Keep system messages; drop the oldest non-system message repeatedly
    /// until the remainder fits the budget.
    fn truncate_fifo(&self, messages: &[Message], budget: usize) -> Vec<Message> {
        let mut kept: Vec<Message> = messages.to_vec();
        loop {
            let used: usize = kept.iter().map(|m| self.count_message_tokens(m)).sum();
            if used <= budget {
                return kept;
            }
            let drop_idx = kept.iter().position(|m| !Self::is_system(m));
            match drop_idx {
                Some(idx) => {
                    kept.remove(idx);
                }
                None => return kept, // nothing left to drop but system messages
            }
        }
    }

    /// Keep a fixed head + tail window; fill the middle alternately from
    /// both ends inward with whatever still fits.
    fn truncate_middle(&self, messages: &[Message], config: &ContextConfig, budget: usize) -> Vec<Message> {
        if messages.is_empty() {
            return Vec::new();
        }
        let head_count = config.keep_system_messages.max(1).min(messages.len());
        let tail_count = config.keep_recent_messages.min(messages.len());

        let mut kept: std::collections::BTreeSet<usize> = (0..head_count).collect();
        let tail_start = messages.len().saturating_sub(tail_count);
        kept.extend(tail_start..messages.len());

        let mut used: usize = kept.iter().map(|&i| self.count_message_tokens(&messages[i])).sum();

        let mut front = head_count;
        let mut back = tail_start;
        let mut from_front = true;
        while front < back {
            let idx = if from_front { front } else { back - 1 };
            if !kept.contains(&idx) {
                let cost = self.count_message_tokens(&messages[idx]);
                if used + cost <= budget {
                    kept.insert(idx);
                    used += cost;
                }
            }
            if from_front {
                front += 1;
            } else {
                back -= 1;
            }
            from_front = !from_front;
        }

        kept.into_iter().map(|i| messages[i].clone()).collect()
    }

    /// Return a byte-equivalent truncation of an over-long message, with an
    /// explicit marker appended. The message's role/type is preserved.
    pub fn summarize_long_message(&self, message: &Message, cap_chars: usize) -> Message {
        let text = message.content.extract_all_text();
        if text.chars().count() <= cap_chars {
            return message.clone();
        }
        let marker = "\n... [truncated]";
        let budget = cap_chars.saturating_sub(marker.chars().count());
        let truncated: String = text.chars().take(budget).collect();
        Message {
            role: message.role,
            content: ra_domain::tool::MessageContent::Text(format!("{truncated}{marker}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_domain::tool::{Message, Role};

    fn config() -> ContextConfig {
        ContextConfig {
            max_tokens: 100,
            reserve_tokens: 10,
            keep_system_messages: 1,
            keep_recent_messages: 2,
            strategy: TruncationStrategy::Smart,
            min_message_tokens: 5,
            truncate_ratio: 0.9,
        }
    }

    #[test]
    fn char_div4_counts_roughly_quarter_of_length() {
        let cm = ContextManager::default();
        assert_eq!(cm.count_tokens("12345678"), 2);
    }

    #[test]
    fn encoder_name_is_reported() {
        let cm = ContextManager::default();
        assert_eq!(cm.encoder_name(), "char/4");
    }

    #[test]
    fn smart_truncation_keeps_system_and_recent_messages() {
        let cm = ContextManager::default();
        let mut cfg = config();
        cfg.max_tokens = 10_000;
        let messages = vec![
            Message::system("system prompt"),
            Message::user("turn 1"),
            Message::assistant("reply 1"),
            Message::user("turn 2"),
            Message::assistant("reply 2"),
        ];
        let kept = cm.truncate_messages(&messages, &cfg);
        assert!(kept.iter().any(|m| matches!(m.role, Role::System)));
        assert_eq!(kept.last().unwrap().content.text(), Some("reply 2"));
    }

    #[test]
    fn fifo_truncation_drops_oldest_non_system_first() {
        let cm = ContextManager::default();
        let mut cfg = config();
        cfg.strategy = TruncationStrategy::Fifo;
        cfg.max_tokens = 20;
        cfg.reserve_tokens = 0;
        let messages = vec![
            Message::system("sys"),
            Message::user("old message one"),
            Message::user("newer message two"),
        ];
        let kept = cm.truncate_messages(&messages, &cfg);
        assert!(kept.iter().any(|m| matches!(m.role, Role::System)));
        assert!(kept.len() < messages.len());
    }

    #[test]
    fn middle_truncation_preserves_order() {
        let cm = ContextManager::default();
        let mut cfg = config();
        cfg.strategy = TruncationStrategy::Middle;
        cfg.max_tokens = 10_000;
        let messages = vec![
            Message::system("sys"),
            Message::user("a"),
            Message::user("b"),
            Message::user("c"),
            Message::user("d"),
        ];
        let kept = cm.truncate_messages(&messages, &cfg);
        let texts: Vec<_> = kept.iter().filter_map(|m| m.content.text().map(String::from)).collect();
        let mut sorted = texts.clone();
        sorted.sort();
        // order preserved means original relative order, not alphabetical;
        // check indices are increasing by re-deriving positions.
        let positions: Vec<usize> = texts
            .iter()
            .map(|t| messages.iter().position(|m| m.content.text() == Some(t.as_str())).unwrap())
            .collect();
        let mut increasing = positions.clone();
        increasing.sort();
        assert_eq!(positions, increasing);
    }

    #[test]
    fn should_truncate_true_once_ratio_exceeded() {
        let cm = ContextManager::default();
        let cfg = config();
        assert!(cm.should_truncate(&cfg, 95, 0.9));
        assert!(!cm.should_truncate(&cfg, 10, 0.9));
    }

    #[test]
    fn summarize_long_message_preserves_role_and_appends_marker() {
        let cm = ContextManager::default();
        let msg = Message::user(&"x".repeat(100));
        let summarized = cm.summarize_long_message(&msg, 20);
        assert!(matches!(summarized.role, Role::User));
        assert!(summarized.content.extract_all_text().ends_with("[truncated]"));
        assert!(summarized.content.extract_all_text().chars().count() <= 20);
    }

    #[test]
    fn summarize_short_message_is_unchanged() {
        let cm = ContextManager::default();
        let msg = Message::user("short");
        let summarized = cm.summarize_long_message(&msg, 100);
        assert_eq!(summarized.content.text(), Some("short"));
    }
}
