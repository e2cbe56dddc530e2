//! Key layout and TTL policy.
//!
//! Chat-scoped keys wrap the chat id in `{...}` so every key of one chat
//! lands in the same cluster slot and multi-key scripts stay valid.

/// Default key prefix for the riddle game family.
pub const TWENTYQ_KEY_PREFIX: &str = "20q";
/// Default key prefix for the soup game family.
pub const SOUP_KEY_PREFIX: &str = "soup";

/// Session state TTL: 12 hours.
pub const SESSION_TTL_SECS: u64 = 12 * 60 * 60;
/// Chat lock TTL.
pub const LOCK_TTL_SECS: u64 = 300;
/// Surrender vote TTL.
pub const VOTE_TTL_SECS: u64 = 120;
/// Processing token TTL.
pub const PROCESSING_TTL_SECS: u64 = 200;
/// Pending queue TTL.
pub const QUEUE_TTL_SECS: u64 = 300;
/// Guess cooldown TTL.
pub const GUESS_COOLDOWN_SECS: u64 = 30;
/// Chain-skip flag TTL.
pub const CHAIN_SKIP_TTL_SECS: u64 = 60;

/// Key builder for one game family (`20q:` or `soup:`).
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
    session_segment: &'static str,
}

impl KeySpace {
    /// Key space under the given prefix with a custom session segment.
    pub fn new(prefix: impl Into<String>, session_segment: &'static str) -> Self {
        Self {
            prefix: prefix.into(),
            session_segment,
        }
    }

    /// Riddle game key space (`20q:riddle:session:{chat}` family).
    pub fn twentyq() -> Self {
        Self::new(TWENTYQ_KEY_PREFIX, "riddle:session")
    }

    /// Soup game key space (`soup:puzzle:session:{chat}` family).
    pub fn soup() -> Self {
        Self::new(SOUP_KEY_PREFIX, "puzzle:session")
    }

    /// Configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Primary session value (riddle secret or soup game state).
    pub fn session(&self, chat: &str) -> String {
        format!("{}:{}:{{{chat}}}", self.prefix, self.session_segment)
    }

    /// Ordered Q/A history list.
    pub fn history(&self, chat: &str) -> String {
        format!("{}:history:{{{chat}}}", self.prefix)
    }

    /// Active category label.
    pub fn category(&self, chat: &str) -> String {
        format!("{}:category:{{{chat}}}", self.prefix)
    }

    /// Hint counter.
    pub fn hints(&self, chat: &str) -> String {
        format!("{}:hints:{{{chat}}}", self.prefix)
    }

    /// Registered players.
    pub fn players(&self, chat: &str) -> String {
        format!("{}:players:{{{chat}}}", self.prefix)
    }

    /// Wrong guesses for the whole chat.
    pub fn wrong_guesses(&self, chat: &str) -> String {
        format!("{}:wrongGuesses:{{{chat}}}", self.prefix)
    }

    /// Wrong guesses for one user in the chat.
    pub fn wrong_guesses_for(&self, chat: &str, user: &str) -> String {
        format!("{}:wrongGuesses:{{{chat}}}:{user}", self.prefix)
    }

    /// Bounded most-recent topic history, optionally per category.
    pub fn topics(&self, chat: &str, category: Option<&str>) -> String {
        match category {
            Some(cat) => format!("{}:topics:{{{chat}}}:{cat}", self.prefix),
            None => format!("{}:topics:{{{chat}}}", self.prefix),
        }
    }

    /// Surrender vote value.
    pub fn surrender_vote(&self, chat: &str) -> String {
        format!("{}:surrender:vote:{{{chat}}}", self.prefix)
    }

    /// Pending queue payload hash.
    pub fn pending_data(&self, chat: &str) -> String {
        format!("{}:pending-messages:data:{{{chat}}}", self.prefix)
    }

    /// Pending queue order list.
    pub fn pending_order(&self, chat: &str) -> String {
        format!("{}:pending-messages:order:{{{chat}}}", self.prefix)
    }

    /// Chain-skip flag.
    pub fn chain_skip(&self, chat: &str) -> String {
        format!("{}:pending-messages:chain-skip:{{{chat}}}", self.prefix)
    }

    /// Exclusive (write) lock key.
    pub fn lock(&self, chat: &str) -> String {
        format!("{}:lock:{{{chat}}}", self.prefix)
    }

    /// Shared (read) lock key.
    pub fn lock_read(&self, chat: &str) -> String {
        format!("{}:lock:{{{chat}}}:read", self.prefix)
    }

    /// Processing token key.
    pub fn processing(&self, chat: &str) -> String {
        format!("{}:lock:processing:{{{chat}}}", self.prefix)
    }

    /// Per-(chat, user) guess cooldown key.
    pub fn guess_cooldown(&self, chat: &str, user: &str) -> String {
        format!("{}:guess-cooldown:{{{chat}}}:{user}", self.prefix)
    }

    /// Global synonym verdict hash.
    pub fn synonyms(&self) -> String {
        format!("{}:synonyms", self.prefix)
    }

    /// Cross-chat puzzle signature set.
    pub fn signatures(&self) -> String {
        format!("{}:puzzle:signatures", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::KeySpace;

    #[test]
    fn chat_scoped_keys_share_a_slot_tag() {
        let keys = KeySpace::twentyq();
        assert_eq!(keys.session("c1"), "20q:riddle:session:{c1}");
        assert_eq!(keys.lock("c1"), "20q:lock:{c1}");
        assert_eq!(keys.lock_read("c1"), "20q:lock:{c1}:read");
        assert_eq!(keys.processing("c1"), "20q:lock:processing:{c1}");
        assert_eq!(keys.pending_data("c1"), "20q:pending-messages:data:{c1}");
        assert_eq!(keys.pending_order("c1"), "20q:pending-messages:order:{c1}");
        assert_eq!(keys.wrong_guesses_for("c1", "u1"), "20q:wrongGuesses:{c1}:u1");
        assert_eq!(keys.topics("c1", Some("animals")), "20q:topics:{c1}:animals");
        assert_eq!(keys.synonyms(), "20q:synonyms");
    }
}
