//! Story validator
//!
//! A valid story pairs sentences and owned words one to one: every sentence
//! contains exactly one owned word or phrase, no word appears in two
//! sentences, and every owned word is used. The first violated rule, in
//! sentence order, is reported.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;

const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Message returned for a story that passes every rule
pub const SUCCESS_MESSAGE: &str = "Story check passed! Each sentence uses one word or phrase, and all words or phrases are used.";

/// Why a story was rejected. Sentence numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValidationFailure {
    NoMatch { sentence: usize },
    MultipleMatches { sentence: usize, words: Vec<String> },
    WordReused { sentence: usize, word: String },
    TooFewSentences { owned: usize, sentences: usize },
    TooManySentences { owned: usize, sentences: usize },
    UnusedWords(Vec<String>),
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFailure::NoMatch { sentence } => write!(
                f,
                "Sentence {sentence} does not contain any purchased words or phrases."
            ),
            ValidationFailure::MultipleMatches { sentence, words } => write!(
                f,
                "Sentence {sentence} contains multiple words or phrases: {}. Each sentence should contain only one word or phrase.",
                words.join(", ")
            ),
            ValidationFailure::WordReused { word, .. } => write!(
                f,
                "Word or phrase '{word}' is used in multiple sentences. Each word or phrase should be used in only one sentence."
            ),
            ValidationFailure::TooFewSentences { owned, sentences } => write!(
                f,
                "You own {owned} words or phrases, but there are only {sentences} sentences. Each word or phrase must be used in a sentence."
            ),
            ValidationFailure::TooManySentences { owned, sentences } => write!(
                f,
                "You own {owned} words or phrases, but there are {sentences} sentences. Each sentence must use exactly one word or phrase."
            ),
            ValidationFailure::UnusedWords(words) => write!(
                f,
                "The following words or phrases are not used: {}. All words or phrases must be used.",
                words.join(", ")
            ),
        }
    }
}

/// Outcome of [`validate_story`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StoryValidation {
    /// Sentence index (0-based) to the word it uses
    Valid { matches: BTreeMap<usize, String> },
    Invalid(ValidationFailure),
}

impl StoryValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, StoryValidation::Valid { .. })
    }

    /// Human-readable result shown to the participant
    pub fn message(&self) -> String {
        match self {
            StoryValidation::Valid { .. } => SUCCESS_MESSAGE.to_string(),
            StoryValidation::Invalid(reason) => reason.to_string(),
        }
    }

    pub fn failure(&self) -> Option<&ValidationFailure> {
        match self {
            StoryValidation::Valid { .. } => None,
            StoryValidation::Invalid(reason) => Some(reason),
        }
    }
}

/// Split on runs of terminal punctuation, dropping blank fragments
fn sentences(content: &str) -> Vec<&str> {
    content
        .split(SENTENCE_TERMINATORS)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Check `content` against the participant's owned words or phrases
pub fn validate_story<S: AsRef<str>>(content: &str, owned_words: &[S]) -> StoryValidation {
    let owned: Vec<&str> = owned_words.iter().map(|w| w.as_ref()).collect();
    let lowered: Vec<String> = owned.iter().map(|w| w.to_lowercase()).collect();
    let sentences = sentences(content);

    let mut used: HashSet<&str> = HashSet::new();
    let mut matches = BTreeMap::new();

    for (index, sentence) in sentences.iter().enumerate() {
        let sentence_lower = sentence.to_lowercase();
        let found: Vec<&str> = owned
            .iter()
            .zip(&lowered)
            .filter(|(_, lower)| sentence_lower.contains(lower.as_str()))
            .map(|(word, _)| *word)
            .collect();

        let number = index + 1;
        let word = match found.as_slice() {
            [] => return StoryValidation::Invalid(ValidationFailure::NoMatch { sentence: number }),
            [word] => *word,
            _ => {
                return StoryValidation::Invalid(ValidationFailure::MultipleMatches {
                    sentence: number,
                    words: found.iter().map(|w| w.to_string()).collect(),
                });
            }
        };

        if !used.insert(word) {
            return StoryValidation::Invalid(ValidationFailure::WordReused {
                sentence: number,
                word: word.to_string(),
            });
        }
        matches.insert(index, word.to_string());
    }

    let (owned_count, sentence_count) = (owned.len(), sentences.len());
    if sentence_count < owned_count {
        return StoryValidation::Invalid(ValidationFailure::TooFewSentences {
            owned: owned_count,
            sentences: sentence_count,
        });
    }
    if sentence_count > owned_count {
        return StoryValidation::Invalid(ValidationFailure::TooManySentences {
            owned: owned_count,
            sentences: sentence_count,
        });
    }

    if let Some(failure) = unused_words(&owned, &used) {
        return StoryValidation::Invalid(failure);
    }

    StoryValidation::Valid { matches }
}

/// Owned words missing from `used`, in owned order
fn unused_words(owned: &[&str], used: &HashSet<&str>) -> Option<ValidationFailure> {
    let unused: Vec<String> = owned
        .iter()
        .filter(|w| !used.contains(*w))
        .map(|w| w.to_string())
        .collect();
    (!unused.is_empty()).then_some(ValidationFailure::UnusedWords(unused))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned() -> Vec<String> {
        vec!["quantum".into(), "black hole".into(), "galaxy".into()]
    }

    #[test]
    fn test_valid_story_maps_every_sentence() {
        let story = "The quantum cat slept. A Black Hole yawned!! The galaxy spun?";
        let result = validate_story(story, &owned());
        assert!(result.is_valid());
        assert_eq!(result.message(), SUCCESS_MESSAGE);
        let StoryValidation::Valid { matches } = result else {
            panic!("expected valid story");
        };
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[&0], "quantum");
        assert_eq!(matches[&1], "black hole");
        assert_eq!(matches[&2], "galaxy");
    }

    #[test]
    fn test_sentence_without_owned_word() {
        let story = "The quantum cat slept. Nothing here. The galaxy spun.";
        let result = validate_story(story, &owned());
        assert_eq!(
            result.failure(),
            Some(&ValidationFailure::NoMatch { sentence: 2 })
        );
        assert_eq!(
            result.message(),
            "Sentence 2 does not contain any purchased words or phrases."
        );
    }

    #[test]
    fn test_sentence_with_two_owned_words() {
        let story = "The quantum galaxy. A black hole.";
        let result = validate_story(story, &owned());
        assert_eq!(
            result.message(),
            "Sentence 1 contains multiple words or phrases: quantum, galaxy. Each sentence should contain only one word or phrase."
        );
    }

    #[test]
    fn test_word_reused_across_sentences() {
        let story = "Quantum one. Quantum two. A galaxy.";
        let result = validate_story(story, &owned());
        assert_eq!(
            result.failure(),
            Some(&ValidationFailure::WordReused {
                sentence: 2,
                word: "quantum".to_string()
            })
        );
        assert_eq!(
            result.message(),
            "Word or phrase 'quantum' is used in multiple sentences. Each word or phrase should be used in only one sentence."
        );
    }

    #[test]
    fn test_too_few_sentences() {
        let story = "Quantum one. A galaxy.";
        let result = validate_story(story, &owned());
        assert_eq!(
            result.message(),
            "You own 3 words or phrases, but there are only 2 sentences. Each word or phrase must be used in a sentence."
        );
    }

    #[test]
    fn test_too_many_sentences_message() {
        // Per-sentence checks already cap the sentence count at the number
        // of distinct owned words, so the message is checked directly.
        let failure = ValidationFailure::TooManySentences {
            owned: 1,
            sentences: 2,
        };
        assert_eq!(
            failure.to_string(),
            "You own 1 words or phrases, but there are 2 sentences. Each sentence must use exactly one word or phrase."
        );
    }

    #[test]
    fn test_no_owned_words() {
        let result = validate_story("Quantum cat.", &Vec::<String>::new());
        assert_eq!(
            result.failure(),
            Some(&ValidationFailure::NoMatch { sentence: 1 })
        );
    }

    #[test]
    fn test_unused_words_reported_in_owned_order() {
        let used: HashSet<&str> = ["galaxy"].into_iter().collect();
        let failure = unused_words(&["quantum", "galaxy", "black hole"], &used).unwrap();
        assert_eq!(
            failure.to_string(),
            "The following words or phrases are not used: quantum, black hole. All words or phrases must be used."
        );
        assert!(unused_words(&["galaxy"], &used).is_none());
    }

    #[test]
    fn test_first_violation_wins() {
        // Sentence 1 has two words, sentence 2 has none: the earlier rule fires
        let story = "Quantum galaxy. Nothing.";
        let result = validate_story(story, &owned());
        assert!(matches!(
            result.failure(),
            Some(ValidationFailure::MultipleMatches { sentence: 1, .. })
        ));
    }

    #[test]
    fn test_blank_fragments_are_ignored() {
        let story = "...Quantum!?!  .  Galaxy...  A black hole";
        assert!(validate_story(story, &owned()).is_valid());
    }
}
