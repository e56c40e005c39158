//! Achievement public view, bucket classification, and mastery
//! detection (spec §4.E "Achievement bucket classification", "Mastery";
//! SPEC_FULL §11.1-§11.3 supplements).

use super::trigger::{Trigger, TriggerState};
use crate::memref::MemRefId;
use bitflags::bitflags;

bitflags! {
    /// SPEC_FULL §11.2: which modes this achievement has been unlocked
    /// in, mirroring the original library's softcore/hardcore unlock bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UnlockMask: u8 {
        const SOFTCORE = 0b01;
        const HARDCORE = 0b10;
    }
}

bitflags! {
    /// SPEC_FULL §11.3: achievement category, used to separate
    /// official/core content from unofficial (community test) sets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Category: u8 {
        const CORE = 0b01;
        const UNOFFICIAL = 0b10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AchievementBucket {
    ActiveChallenge,
    RecentlyUnlocked,
    AlmostThere,
    Locked,
    Unlocked,
    Unsupported,
    Unofficial,
}

const RECENCY_WINDOW_SECS: i64 = 15 * 60;
const ALMOST_THERE_THRESHOLD: f64 = 80.0;

pub struct Achievement {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub badge: String,
    pub points: u32,
    pub category: Category,
    pub unlocked_mask: UnlockMask,
    pub unlock_time: Option<i64>,
    pub trigger: Trigger,
    pub bucket: AchievementBucket,
    pub measured_progress: String,
    pub measured_percent: f64,
    /// Direct memrefs this trigger reads, captured at load for the
    /// one-time address-validity check (spec §8 S6): a short read on
    /// the first evaluated frame permanently disables the achievement.
    pub direct_memrefs: Vec<MemRefId>,
    pub address_validated: bool,
}

impl Achievement {
    pub fn new(id: u32, title: String, description: String, badge: String, points: u32, category: Category, trigger: Trigger) -> Self {
        let bucket = if trigger.state == TriggerState::Disabled {
            AchievementBucket::Unsupported
        } else if category.contains(Category::UNOFFICIAL) {
            AchievementBucket::Unofficial
        } else {
            AchievementBucket::Locked
        };
        Achievement {
            id,
            title,
            description,
            badge,
            points,
            category,
            unlocked_mask: UnlockMask::empty(),
            unlock_time: None,
            trigger,
            bucket,
            measured_progress: String::new(),
            measured_percent: 0.0,
            direct_memrefs: Vec::new(),
            address_validated: false,
        }
    }

    /// Recomputes `measured_percent`/`measured_progress` from the
    /// trigger's captured measured value against its parsed target,
    /// clamping display at 99% until the achievement actually unlocks
    /// (Open Question decision, DESIGN.md).
    pub fn refresh_measured(&mut self) {
        if self.trigger.state == TriggerState::Triggered {
            self.measured_progress.clear();
            self.measured_percent = 0.0;
            return;
        }
        let target = self.trigger.expr.measured_target.unwrap_or(0);
        if target == 0 {
            self.measured_progress.clear();
            self.measured_percent = 0.0;
            return;
        }
        let value = self.trigger.measured_value.map(|v| v.as_i64()).unwrap_or(0).max(0) as f64;
        let percent = ((value / target as f64) * 100.0).clamp(0.0, 99.0);
        self.measured_percent = percent;
        self.measured_progress = format!("{}%", percent as u64);
    }

    /// Re-derives `bucket` from current state (spec §4.E classification
    /// rule; `now` is a caller-supplied monotonic unix-seconds clock so
    /// this stays a pure function of observable state).
    pub fn rebucket(&mut self, now: i64) {
        self.bucket = if self.trigger.state == TriggerState::Disabled {
            AchievementBucket::Unsupported
        } else if self.category.contains(Category::UNOFFICIAL) {
            AchievementBucket::Unofficial
        } else if self.trigger.state == TriggerState::Triggered {
            let recent = self.unlock_time.map(|t| now - t <= RECENCY_WINDOW_SECS).unwrap_or(false);
            if recent {
                AchievementBucket::RecentlyUnlocked
            } else {
                AchievementBucket::Unlocked
            }
        } else if self.trigger.state == TriggerState::Primed {
            AchievementBucket::ActiveChallenge
        } else if self.measured_percent >= ALMOST_THERE_THRESHOLD {
            AchievementBucket::AlmostThere
        } else {
            AchievementBucket::Locked
        };
    }
}

/// SPEC_FULL §11.1: `Game::achievement_summary()`'s per-bucket counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AchievementSummary {
    pub active_challenge: u32,
    pub recently_unlocked: u32,
    pub almost_there: u32,
    pub locked: u32,
    pub unlocked: u32,
    pub unsupported: u32,
    pub unofficial: u32,
}

pub fn summarize(achievements: &[Achievement]) -> AchievementSummary {
    let mut s = AchievementSummary::default();
    for a in achievements {
        match a.bucket {
            AchievementBucket::ActiveChallenge => s.active_challenge += 1,
            AchievementBucket::RecentlyUnlocked => s.recently_unlocked += 1,
            AchievementBucket::AlmostThere => s.almost_there += 1,
            AchievementBucket::Locked => s.locked += 1,
            AchievementBucket::Unlocked => s.unlocked += 1,
            AchievementBucket::Unsupported => s.unsupported += 1,
            AchievementBucket::Unofficial => s.unofficial += 1,
        }
    }
    s
}

/// Mastery: every Core achievement has reached Triggered.
pub fn mastery_reached(achievements: &[Achievement]) -> bool {
    let core: Vec<&Achievement> = achievements.iter().filter(|a| a.category.contains(Category::CORE)).collect();
    !core.is_empty() && core.iter().all(|a| a.trigger.state == TriggerState::Triggered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParsedExpression;

    fn achievement(state: TriggerState, category: Category) -> Achievement {
        let mut trigger = Trigger::new(ParsedExpression::default());
        trigger.state = state;
        Achievement::new(1, "T".into(), "D".into(), "badge".into(), 10, category, trigger)
    }

    #[test]
    fn unofficial_always_buckets_unofficial() {
        let mut a = achievement(TriggerState::Triggered, Category::UNOFFICIAL);
        a.rebucket(1000);
        assert_eq!(a.bucket, AchievementBucket::Unofficial);
    }

    #[test]
    fn recently_unlocked_within_window() {
        let mut a = achievement(TriggerState::Triggered, Category::CORE);
        a.unlock_time = Some(1000);
        a.rebucket(1000 + RECENCY_WINDOW_SECS - 1);
        assert_eq!(a.bucket, AchievementBucket::RecentlyUnlocked);
        a.rebucket(1000 + RECENCY_WINDOW_SECS + 1);
        assert_eq!(a.bucket, AchievementBucket::Unlocked);
    }

    #[test]
    fn mastery_requires_all_core_triggered() {
        let a1 = achievement(TriggerState::Triggered, Category::CORE);
        let a2 = achievement(TriggerState::Active, Category::CORE);
        assert!(!mastery_reached(&[a1, a2]));
    }
}
