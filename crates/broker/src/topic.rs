use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between the words of a routing key or pattern.
pub const WORD_SEPARATOR: char = '.';

/// Pattern word matching exactly one key word.
pub const SINGLE_WORD: &str = "*";

/// Pattern word matching zero or more key words.
pub const ZERO_OR_MORE_WORDS: &str = "#";

/// Errors that can occur with routing key and pattern validation
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TopicError {
    /// Key or pattern is empty
    #[error("routing key or pattern cannot be empty")]
    Empty,

    /// Two separators with nothing between them, or a leading/trailing separator
    #[error("empty word in {0:?}")]
    EmptyWord(String),

    /// A routing key contains a wildcard word
    #[error("routing key cannot contain wildcards: {0:?}")]
    ContainsWildcards(String),
}

/// A validated routing key (no wildcards)
///
/// Examples: "user.created", "invoice.paid", "system.node.started"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Create a new routing key after validation
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty, has an empty word, or contains
    /// a `*` or `#` word.
    pub fn new(key: impl Into<String>) -> Result<Self, TopicError> {
        let key = key.into();
        validate_words(&key)?;
        if key.split(WORD_SEPARATOR).any(is_wildcard) {
            return Err(TopicError::ContainsWildcards(key));
        }
        Ok(Self(key))
    }

    /// Get the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned string
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Get words
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.0.split(WORD_SEPARATOR)
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoutingKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A binding pattern (can contain wildcards)
///
/// - `*` matches exactly one word
/// - `#` matches zero or more words, anywhere in the pattern
///
/// Examples: "user.*", "#.failed", "audit.#.eu"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingPattern(String);

impl RoutingPattern {
    /// Create a new routing pattern after validation
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is empty or has an empty word.
    pub fn new(pattern: impl Into<String>) -> Result<Self, TopicError> {
        let pattern = pattern.into();
        validate_words(&pattern)?;
        Ok(Self(pattern))
    }

    /// Get the pattern as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned string
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// The first word when it is a literal, `None` when the pattern starts
    /// with a wildcard.
    #[must_use]
    pub fn literal_prefix(&self) -> Option<&str> {
        self.0
            .split(WORD_SEPARATOR)
            .next()
            .filter(|word| !is_wildcard(word))
    }

    /// Check if this pattern matches a routing key
    #[must_use]
    pub fn matches(&self, routing_key: &str) -> bool {
        topic_matches(routing_key, &self.0)
    }
}

impl fmt::Display for RoutingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoutingPattern {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<RoutingKey> for RoutingPattern {
    fn from(key: RoutingKey) -> Self {
        Self(key.0)
    }
}

fn is_wildcard(word: &str) -> bool {
    word == SINGLE_WORD || word == ZERO_OR_MORE_WORDS
}

fn validate_words(value: &str) -> Result<(), TopicError> {
    if value.is_empty() {
        return Err(TopicError::Empty);
    }
    if value.split(WORD_SEPARATOR).any(str::is_empty) {
        return Err(TopicError::EmptyWord(value.to_string()));
    }
    Ok(())
}

/// Check if a routing key matches a topic pattern
///
/// Both sides are split on `.` and the whole key must be consumed by the
/// whole pattern. `*` consumes exactly one word, `#` consumes any number of
/// words (including none), everything else must be equal. Runs in
/// `O(key words * pattern words)` regardless of how many `#` the pattern has.
#[must_use]
pub fn topic_matches(routing_key: &str, pattern: &str) -> bool {
    let key: Vec<&str> = routing_key.split(WORD_SEPARATOR).collect();
    let pattern: Vec<&str> = pattern.split(WORD_SEPARATOR).collect();
    let (k, p) = (key.len(), pattern.len());

    // matched[i][j]: key[i..] is matched by pattern[j..]
    let mut matched = vec![vec![false; p + 1]; k + 1];
    matched[k][p] = true;

    for j in (0..p).rev() {
        for i in (0..=k).rev() {
            matched[i][j] = match pattern[j] {
                ZERO_OR_MORE_WORDS => matched[i][j + 1] || (i < k && matched[i + 1][j]),
                SINGLE_WORD => i < k && matched[i + 1][j + 1],
                word => i < k && key[i] == word && matched[i + 1][j + 1],
            };
        }
    }

    matched[0][0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_key_validation() {
        assert!(RoutingKey::new("user.created").is_ok());
        assert!(RoutingKey::new("system.node.started").is_ok());
        assert!(RoutingKey::new("single").is_ok());
        assert!(RoutingKey::new("a*b.c#d").is_ok());

        assert_eq!(RoutingKey::new(""), Err(TopicError::Empty));
        assert!(matches!(
            RoutingKey::new("user..created"),
            Err(TopicError::EmptyWord(_))
        ));
        assert!(matches!(
            RoutingKey::new(".user"),
            Err(TopicError::EmptyWord(_))
        ));
        assert!(matches!(
            RoutingKey::new("user.*"),
            Err(TopicError::ContainsWildcards(_))
        ));
        assert!(matches!(
            RoutingKey::new("#"),
            Err(TopicError::ContainsWildcards(_))
        ));
    }

    #[test]
    fn test_pattern_validation() {
        assert!(RoutingPattern::new("user.*").is_ok());
        assert!(RoutingPattern::new("#").is_ok());
        assert!(RoutingPattern::new("a.#.b.#").is_ok());

        assert_eq!(RoutingPattern::new(""), Err(TopicError::Empty));
        assert!(matches!(
            RoutingPattern::new("user.#."),
            Err(TopicError::EmptyWord(_))
        ));
    }

    #[test]
    fn test_exact_and_single_word() {
        assert!(topic_matches("user.created", "user.created"));
        assert!(!topic_matches("user.created", "user.deleted"));
        assert!(!topic_matches("user.created", "User.created"));

        assert!(topic_matches("user.created", "user.*"));
        assert!(topic_matches("user.created", "*.created"));
        assert!(topic_matches("user.created", "*.*"));
        assert!(!topic_matches("user", "user.*"));
        assert!(!topic_matches("user.created.v2", "user.*"));
    }

    #[test]
    fn test_zero_or_more_words() {
        assert!(topic_matches("user", "user.#"));
        assert!(topic_matches("user.created", "user.#"));
        assert!(topic_matches("user.created.v2", "user.#"));
        assert!(!topic_matches("order.created", "user.#"));

        assert!(topic_matches("a", "#"));
        assert!(topic_matches("a.b.c", "#"));

        assert!(topic_matches("payment.failed", "#.failed"));
        assert!(topic_matches("failed", "#.failed"));
        assert!(!topic_matches("failed.payment", "#.failed"));

        assert!(topic_matches("audit.eu", "audit.#.eu"));
        assert!(topic_matches("audit.x.y.eu", "audit.#.eu"));
        assert!(!topic_matches("audit.x.y.us", "audit.#.eu"));
    }

    #[test]
    fn test_multiple_wildcards() {
        assert!(topic_matches("a.b.c.d", "#.b.#"));
        assert!(topic_matches("b", "#.b.#"));
        assert!(!topic_matches("a.c.d", "#.b.#"));

        assert!(topic_matches("a.b.c", "#.*"));
        assert!(topic_matches("a", "#.*"));
        assert!(topic_matches("a.b", "*.#.*"));
        assert!(!topic_matches("a", "*.#.*"));

        let key = ["x"; 40].join(".");
        let pattern = ["#"; 20].join(".") + ".y";
        assert!(!topic_matches(&key, &pattern));
    }

    #[test]
    fn test_pattern_methods() {
        let pattern = RoutingPattern::new("user.*").unwrap();
        assert!(pattern.matches("user.created"));
        assert!(!pattern.matches("user.created.v2"));
        assert_eq!(pattern.literal_prefix(), Some("user"));
        assert_eq!(RoutingPattern::new("#.failed").unwrap().literal_prefix(), None);
        assert_eq!(RoutingPattern::new("*.created").unwrap().literal_prefix(), None);

        let key = RoutingKey::new("user.created").unwrap();
        assert_eq!(key.words().collect::<Vec<_>>(), vec!["user", "created"]);
        assert_eq!(RoutingPattern::from(key).as_str(), "user.created");
    }
}
