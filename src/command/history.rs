//! Bounded history of processed utterances

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::intent::Intent;

pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub utterance: String,
    pub intent: Option<Intent>,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Ring buffer; the oldest entry goes when a new one would overflow
#[derive(Debug)]
pub struct CommandHistory {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
}

impl CommandHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn record(&mut self, utterance: &str, intent: Option<Intent>, success: bool) -> HistoryEntry {
        let entry = HistoryEntry {
            utterance: utterance.to_string(),
            intent,
            success,
            timestamp: Utc::now(),
        };

        while self.entries.len() >= self.limit.max(1) {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        entry
    }

    /// Entries, newest first
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(HISTORY_LIMIT)
    }
}
