//! Response classification.
//!
//! The bridge decides whether a resolved response finishes the task or
//! asks the user for more input. The policy sits behind the
//! [`ResponseClassifier`] trait so the default lexical heuristic can be
//! swapped for a structured contract later without touching the adapter.

/// Verdict for one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The response answers the query; the task is done.
    Complete,
    /// The response asks the user to clarify or supply more input.
    NeedsInput,
}

/// Policy deciding how a response text maps to a [`Classification`].
///
/// # Object Safety
///
/// Object-safe by construction; the bridge holds it as
/// `Arc<dyn ResponseClassifier>`.
pub trait ResponseClassifier: Send + Sync {
    /// Human-readable name for this classifier (e.g. "lexical").
    fn name(&self) -> &str;

    /// Classify one response text.
    fn classify(&self, response: &str) -> Classification;
}

// Compile-time assertion: ResponseClassifier must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn ResponseClassifier) {}
};

/// Phrases that signal the agent needs more input from the user.
pub const INPUT_TRIGGER_PHRASES: [&str; 6] = [
    "need more",
    "specify",
    "unclear",
    "provide more details",
    "which currency",
    "what amount",
];

/// Default classifier: case-insensitive substring match against a fixed
/// trigger phrase set. Any hit means [`Classification::NeedsInput`].
#[derive(Debug, Clone)]
pub struct LexicalClassifier {
    phrases: Vec<String>,
}

impl LexicalClassifier {
    /// Build a classifier over a custom phrase set.
    ///
    /// Phrases are lowercased once up front; matching lowercases the
    /// response per call.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.into().to_lowercase())
                .collect(),
        }
    }
}

impl Default for LexicalClassifier {
    fn default() -> Self {
        Self::new(INPUT_TRIGGER_PHRASES)
    }
}

impl ResponseClassifier for LexicalClassifier {
    fn name(&self) -> &str {
        "lexical"
    }

    fn classify(&self, response: &str) -> Classification {
        let lowered = response.to_lowercase();
        if self.phrases.iter().any(|p| lowered.contains(p.as_str())) {
            Classification::NeedsInput
        } else {
            Classification::Complete
        }
    }
}
