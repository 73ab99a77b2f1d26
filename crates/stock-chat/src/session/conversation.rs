//! Turn history and the instrument currently being discussed

use crate::market::{Instrument, InstrumentQuery};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Phrases that stand for the current instrument
const REFERENCES: &[&str] = &["this stock", "that stock", "the stock", "same stock", "it"];

const PUNCTUATION: [char; 4] = ['?', '.', ',', '!'];

/// Longest response excerpt kept per turn
const EXCERPT_CHARS: usize = 200;

fn is_word(word: &str, expected: &str) -> bool {
    word.trim_end_matches(PUNCTUATION).eq_ignore_ascii_case(expected)
}

/// User input after reference substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    pub text: String,
    /// The instrument a reference stood for, pinned to its exchange and type
    pub referent: Option<InstrumentQuery>,
}

/// A single exchange in the conversation
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub user_input: String,
    /// First characters of the response
    pub response_excerpt: String,
    pub instruments: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Bounded conversation history
#[derive(Debug)]
pub struct ConversationHistory {
    turns: VecDeque<ConversationTurn>,
    current: Option<Instrument>,
    max_turns: usize,
}

impl ConversationHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_turns.min(64)),
            current: None,
            max_turns: max_turns.max(1),
        }
    }

    /// Record a turn; the first instrument becomes the current one
    pub fn add_turn(&mut self, user_input: &str, response: &str, instruments: &[Instrument]) {
        if let Some(first) = instruments.first() {
            self.current = Some(first.clone());
        }
        self.turns.push_back(ConversationTurn {
            user_input: user_input.to_string(),
            response_excerpt: response.chars().take(EXCERPT_CHARS).collect(),
            instruments: instruments.iter().map(|i| i.symbol.clone()).collect(),
            timestamp: Utc::now(),
        });
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    pub fn current(&self) -> Option<&Instrument> {
        self.current.as_ref()
    }

    /// Query that pins the current instrument to its exchange and type
    pub fn current_query(&self) -> Option<InstrumentQuery> {
        self.current.as_ref().map(|i| {
            InstrumentQuery::new(&i.symbol)
                .on(i.exchange)
                .of_type(i.instrument_type)
        })
    }

    /// Replace "it" / "this stock" with the current symbol
    ///
    /// The input comes back unchanged, with no referent, when nothing is
    /// being discussed or no reference phrase is present.
    pub fn resolve_references(&self, input: &str) -> ResolvedInput {
        let unchanged = || ResolvedInput {
            text: input.to_string(),
            referent: None,
        };
        let Some(current) = &self.current else {
            return unchanged();
        };
        let mut words: Vec<String> = input.split_whitespace().map(str::to_string).collect();
        let mut replaced = false;

        for phrase in REFERENCES {
            let parts: Vec<&str> = phrase.split(' ').collect();
            let mut i = 0;
            while i + parts.len() <= words.len() {
                let end = i + parts.len();
                let names_sector = (i > 0 && is_word(&words[i - 1], "sector"))
                    || words.get(end).is_some_and(|w| is_word(w, "sector"));
                let matches = !names_sector
                    && words[i..end].iter().zip(&parts).all(|(w, p)| {
                        let w = w.trim_end_matches(PUNCTUATION);
                        // All-caps words are symbols (`IT` is a sector)
                        w != w.to_ascii_uppercase() && w.eq_ignore_ascii_case(p)
                    });
                if matches {
                    let last = &words[end - 1];
                    let trailing = last[last.trim_end_matches(PUNCTUATION).len()..].to_string();
                    words[i] = format!("{}{trailing}", current.symbol);
                    words.drain(i + 1..end);
                    replaced = true;
                }
                i += 1;
            }
        }

        if !replaced {
            return unchanged();
        }
        ResolvedInput {
            text: words.join(" "),
            referent: self.current_query(),
        }
    }

    pub fn turns(&self) -> &VecDeque<ConversationTurn> {
        &self.turns
    }

    pub fn last_turns(&self, n: usize) -> Vec<&ConversationTurn> {
        self.turns.iter().rev().take(n).collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.current = None;
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
