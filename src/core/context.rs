/// Narration history for repetition checks.
use std::collections::VecDeque;

/// Maintains a sliding window of recently accepted narration.
#[derive(Debug, Clone)]
pub struct NarrativeContext {
    window: usize,
    ngram: usize,
    recent: VecDeque<String>,
}

impl Default for NarrativeContext {
    fn default() -> Self {
        Self::new(8, 6)
    }
}

/// Lowercased words with surrounding punctuation stripped.
fn words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn sentences(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_inclusive(|c: char| matches!(c, '.' | '!' | '?'))
        .map(|s| words(s).join(" "))
        .filter(|s| !s.is_empty())
}

impl NarrativeContext {
    /// `window` narrations are remembered; runs of `ngram` words shared
    /// with any of them count as repetition.
    pub fn new(window: usize, ngram: usize) -> Self {
        Self {
            window,
            ngram: ngram.max(2),
            recent: VecDeque::with_capacity(window),
        }
    }

    pub fn record(&mut self, text: &str) {
        if self.window == 0 {
            return;
        }
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(text.to_string());
    }

    /// Most recent narration last.
    pub fn recent(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    pub fn clear(&mut self) {
        self.recent.clear();
    }

    /// Describe the first repetition of recent narration found in `text`,
    /// either a whole repeated sentence or a shared run of words.
    pub fn check_repetition(&self, text: &str) -> Option<String> {
        if self.recent.is_empty() {
            return None;
        }

        for sentence in sentences(text) {
            if self
                .recent
                .iter()
                .any(|past| sentences(past).any(|p| p == sentence))
            {
                return Some(sentence);
            }
        }

        let candidate = words(text);
        if candidate.len() < self.ngram {
            return None;
        }
        for past in &self.recent {
            let past_words = words(past);
            if past_words.len() < self.ngram {
                continue;
            }
            for gram in candidate.windows(self.ngram) {
                if past_words.windows(self.ngram).any(|p| p == gram) {
                    return Some(gram.join(" "));
                }
            }
        }
        None
    }
}
