//! Due-item selection
//!
//! Decides which items to present next. This sits outside the scheduler:
//! it reads [`MemoryState`] but never changes it.
//!
//! - due: reviewed at least once, `next_due_at <= now`, not excluded
//! - cooldown: anything reviewed in the last N minutes is held back
//! - fill: remaining slots go to never-attempted items

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{MemoryState, DEFAULT_COOLDOWN_MINUTES};

/// Presentation-layer debounce for due items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuePolicy {
    pub cooldown: Duration,
}

impl Default for DuePolicy {
    fn default() -> Self {
        Self::with_cooldown_minutes(DEFAULT_COOLDOWN_MINUTES)
    }
}

impl DuePolicy {
    pub fn with_cooldown_minutes(minutes: i64) -> Self {
        Self {
            cooldown: Duration::minutes(minutes.max(0)),
        }
    }

    /// Items last reviewed after this instant are still cooling down.
    pub fn cooldown_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.cooldown
    }

    pub fn in_cooldown(&self, state: &MemoryState, now: DateTime<Utc>) -> bool {
        match state.last_reviewed_at {
            Some(last) => last > self.cooldown_cutoff(now),
            None => false,
        }
    }

    pub fn is_eligible<K>(&self, candidate: &ReviewCandidate<K>, now: DateTime<Utc>) -> bool {
        !candidate.excluded && candidate.state.is_due(now) && !self.in_cooldown(&candidate.state, now)
    }
}

/// A tracked item as seen by the selector.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewCandidate<K> {
    pub item_id: K,
    pub state: MemoryState,
    /// Permanently mastered or otherwise removed from review
    pub excluded: bool,
}

/// Order in which never-attempted items fill a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewItemOrder {
    #[default]
    Insertion,
    Shuffled,
}

impl NewItemOrder {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "insertion" | "sequential" => Some(Self::Insertion),
            "shuffled" | "random" => Some(Self::Shuffled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insertion => "insertion",
            Self::Shuffled => "shuffled",
        }
    }
}

/// A batch of items to present, reviews first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection<K> {
    pub due: Vec<K>,
    pub fresh: Vec<K>,
}

impl<K> Selection<K> {
    pub fn len(&self) -> usize {
        self.due.len() + self.fresh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.due.is_empty() && self.fresh.is_empty()
    }

    pub fn into_items(self) -> Vec<K> {
        let mut items = self.due;
        items.extend(self.fresh);
        items
    }
}

/// Selects up to `limit` items: due reviews (most overdue first, ties by
/// id), then never-attempted items.
///
/// Fresh items come from `candidates` with zero repetitions followed by
/// `unseen`, which lists catalog items that have no memory state yet.
pub fn select_batch<K, R>(
    policy: &DuePolicy,
    candidates: &[ReviewCandidate<K>],
    unseen: &[K],
    limit: usize,
    order: NewItemOrder,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Selection<K>
where
    K: Clone + Ord,
    R: Rng + ?Sized,
{
    if limit == 0 {
        return Selection {
            due: Vec::new(),
            fresh: Vec::new(),
        };
    }

    let mut due: Vec<&ReviewCandidate<K>> = candidates
        .iter()
        .filter(|c| policy.is_eligible(c, now))
        .collect();
    due.sort_by(|a, b| {
        a.state
            .next_due_at
            .cmp(&b.state.next_due_at)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    let due: Vec<K> = due
        .into_iter()
        .take(limit)
        .map(|c| c.item_id.clone())
        .collect();

    let needed = limit - due.len();
    if needed == 0 {
        return Selection {
            due,
            fresh: Vec::new(),
        };
    }

    let mut fresh: Vec<K> = candidates
        .iter()
        .filter(|c| !c.excluded && c.state.is_unseen())
        .map(|c| c.item_id.clone())
        .chain(unseen.iter().cloned())
        .collect();
    if order == NewItemOrder::Shuffled {
        fresh.shuffle(rng);
    }
    fresh.truncate(needed);

    Selection { due, fresh }
}
