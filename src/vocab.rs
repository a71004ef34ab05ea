//! Reaction vocabulary — the fixed catalog of recognized counter names.
//!
//! The catalog lives outside the room core (product/config territory), so the
//! room only sees it through the [`Vocabulary`] trait: a membership predicate
//! plus the name list used to seed a fresh room. Handlers never create
//! counters dynamically; a name outside the vocabulary is silently ignored.

use std::sync::Arc;

/// Injected vocabulary capability. Pure and synchronous.
pub trait Vocabulary: Send + Sync {
    /// Whether `name` belongs to the fixed catalog.
    fn is_valid_name(&self, name: &str) -> bool;

    /// The full catalog, in seed order.
    fn catalog(&self) -> &[String];
}

/// Convenience alias for the injected form.
pub type SharedVocabulary = Arc<dyn Vocabulary>;

// =============================================================================
// EMOJI CATALOG
// =============================================================================

/// Default vocabulary: a small fixed set of emoji.
pub struct EmojiCatalog {
    names: Vec<String>,
}

impl EmojiCatalog {
    pub const DEFAULT_NAMES: [&'static str; 3] = ["👍", "🎈", "❤️"];

    #[must_use]
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { names: names.into_iter().map(Into::into).collect() }
    }
}

impl Default for EmojiCatalog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAMES)
    }
}

impl Vocabulary for EmojiCatalog {
    fn is_valid_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    fn catalog(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
#[path = "vocab_test.rs"]
mod tests;
