//! Per-match question usage, keyed by (category, level).

use std::collections::BTreeMap;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::catalog::{CategoryId, QuestionId};
use crate::error::MatchError;
use crate::scoring::Level;

/// Questions that may be served per (category, level) over a match's lifetime.
pub const QUOTA_PER_SLOT: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
    pub category: CategoryId,
    pub level: Level,
}

/// Questions already served for one (category, level). Never longer than the quota.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UsageSlot {
    used: Vec<QuestionId>,
}

impl UsageSlot {
    pub fn count(&self) -> usize {
        self.used.len()
    }

    pub fn remaining(&self) -> usize {
        QUOTA_PER_SLOT.saturating_sub(self.used.len())
    }

    pub fn used_question_ids(&self) -> &[QuestionId] {
        &self.used
    }
}

/// Stored as a flat list of entries, one per slot that has been touched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UsageEntry {
    pub category_id: CategoryId,
    pub level: Level,
    pub used_question_ids: Vec<QuestionId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<UsageEntry>", into = "Vec<UsageEntry>")]
pub struct UsageTracker {
    slots: BTreeMap<SlotKey, UsageSlot>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, category: CategoryId, level: Level) -> Option<&UsageSlot> {
        self.slots.get(&SlotKey { category, level })
    }

    pub fn count(&self, category: CategoryId, level: Level) -> usize {
        self.slot(category, level).map_or(0, UsageSlot::count)
    }

    /// Fails with `LevelQuotaExceeded` when the slot is full. Otherwise returns
    /// the ids the catalog must exclude when picking the next question.
    pub fn check_slot(
        &self,
        category: CategoryId,
        level: Level,
    ) -> Result<Vec<QuestionId>, MatchError> {
        let used = self
            .slot(category, level)
            .map(|s| s.used.clone())
            .unwrap_or_default();
        if used.len() >= QUOTA_PER_SLOT {
            return Err(MatchError::LevelQuotaExceeded { category, level });
        }
        Ok(used)
    }

    /// Consumes one unit of quota for `question`. Leaves the tracker untouched on error.
    pub fn reserve_slot(
        &mut self,
        category: CategoryId,
        level: Level,
        question: QuestionId,
    ) -> Result<(), MatchError> {
        let excluded = self.check_slot(category, level)?;
        if excluded.contains(&question) {
            return Err(anyhow!(
                "catalog returned question {} which was already served for {}/{}",
                question,
                category,
                level
            )
            .into());
        }
        self.slots
            .entry(SlotKey { category, level })
            .or_default()
            .used
            .push(question);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotKey, &UsageSlot)> {
        self.slots.iter()
    }
}

impl From<Vec<UsageEntry>> for UsageTracker {
    fn from(entries: Vec<UsageEntry>) -> Self {
        let mut slots: BTreeMap<SlotKey, UsageSlot> = BTreeMap::new();
        for entry in entries {
            let slot = slots
                .entry(SlotKey {
                    category: entry.category_id,
                    level: entry.level,
                })
                .or_default();
            for id in entry.used_question_ids {
                if !slot.used.contains(&id) {
                    slot.used.push(id);
                }
            }
        }
        Self { slots }
    }
}

impl From<UsageTracker> for Vec<UsageEntry> {
    fn from(tracker: UsageTracker) -> Self {
        tracker
            .slots
            .into_iter()
            .map(|(key, slot)| UsageEntry {
                category_id: key.category,
                level: key.level,
                used_question_ids: slot.used,
            })
            .collect()
    }
}
