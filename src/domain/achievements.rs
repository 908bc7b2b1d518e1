//! Achievement catalog and the derived snapshot types
//!
//! The catalog is static configuration loaded once at start-up. Snapshots are
//! computed from ledger history and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A points milestone, earned once total points reach `threshold`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointTier {
    pub id: String,
    pub name: String,
    pub description: String,
    pub badge: String,
    pub threshold: i64,
}

/// Specialization in one activity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub badge: String,
    pub activity_type: String,
    /// Share of total points (whole percent) the activity must reach
    pub threshold_percent: i64,
    /// No specialization is awarded below this many total points
    pub min_total_points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub badge: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialBadgeRules {
    pub first_steps: BadgeInfo,
    pub flawless_victory: BadgeInfo,
    pub consistency_king: BadgeInfo,
    /// Consecutive completion days required
    pub consistency_threshold_days: u32,
    pub lightning_fast: BadgeInfo,
    /// Registration-to-completion hours at or under which the badge is earned
    pub lightning_fast_max_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementConfig {
    /// Ascending by threshold
    pub point_tiers: Vec<PointTier>,
    pub activity_rules: Vec<ActivityRule>,
    pub special: SpecialBadgeRules,
}

fn badge(id: &str, name: &str, description: &str, badge: &str) -> BadgeInfo {
    BadgeInfo {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        badge: badge.to_string(),
    }
}

fn tier(id: &str, name: &str, description: &str, emoji: &str, threshold: i64) -> PointTier {
    PointTier {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        badge: emoji.to_string(),
        threshold,
    }
}

fn activity(id: &str, name: &str, description: &str, emoji: &str, kind: &str) -> ActivityRule {
    ActivityRule {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        badge: emoji.to_string(),
        activity_type: kind.to_string(),
        threshold_percent: 60,
        min_total_points: 1000,
    }
}

impl Default for AchievementConfig {
    fn default() -> Self {
        Self {
            point_tiers: vec![
                tier("RISING_STAR", "Rising Star", "Earned 1000 points", "⭐", 1000),
                tier(
                    "SEASONED_EXPLORER",
                    "Seasoned Explorer",
                    "Earned 2000 points",
                    "🌟",
                    2000,
                ),
                tier("ELITE_CHAMPION", "Elite Champion", "Earned 3000 points", "🏆", 3000),
                tier(
                    "LEGENDARY_MASTER",
                    "Legendary Master",
                    "Earned 5000 points",
                    "👑",
                    5000,
                ),
            ],
            activity_rules: vec![
                activity(
                    "CODECRAFT_MASTER",
                    "CodeCraft Master",
                    "60% or more of your points come from coding bounties",
                    "💻",
                    "coding",
                ),
                activity(
                    "VISUAL_VIRTUOSO",
                    "Visual Virtuoso",
                    "60% or more of your points come from design bounties",
                    "🎨",
                    "design",
                ),
                activity(
                    "WORDSMITH_ELITE",
                    "Wordsmith Elite",
                    "60% or more of your points come from writing bounties",
                    "✍️",
                    "writing",
                ),
                activity(
                    "DISCOVERY_PIONEER",
                    "Discovery Pioneer",
                    "60% or more of your points come from research bounties",
                    "🔍",
                    "research",
                ),
            ],
            special: SpecialBadgeRules {
                first_steps: badge(
                    "FIRST_STEPS",
                    "First Steps",
                    "Completed your first bounty",
                    "👣",
                ),
                flawless_victory: badge(
                    "FLAWLESS_VICTORY",
                    "Flawless Victory",
                    "Earned the full points of a bounty",
                    "💯",
                ),
                consistency_king: badge(
                    "CONSISTENCY_KING",
                    "Consistency King",
                    "Completed bounties on 5 consecutive days",
                    "👑",
                ),
                consistency_threshold_days: 5,
                lightning_fast: badge(
                    "LIGHTNING_FAST",
                    "Lightning Fast",
                    "Completed a bounty within 24 hours of registering",
                    "⚡",
                ),
                lightning_fast_max_hours: 24.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    PointsBased,
    ActivityBased,
    SpecialBadge,
}

/// One earned achievement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub badge: String,
    pub kind: AchievementKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_hours: Option<f64>,
    /// Completion that earned it, when one specific completion did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextMilestone {
    pub id: String,
    pub name: String,
    pub threshold: i64,
    pub remaining: i64,
    /// Whole percent toward the threshold
    pub progress: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastestCompletion {
    pub bounty_name: String,
    pub bounty_type: String,
    pub hours: f64,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityBreakdown {
    pub activity_type: String,
    pub count: u64,
    pub points: i64,
    pub berries: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementStatistics {
    pub total_points: i64,
    pub total_berries: i64,
    pub bounty_count: u64,
    pub completed_count: u64,
    pub achievement_count: u64,
    pub next_milestone: Option<NextMilestone>,
    pub current_streak: u32,
    pub fastest_completion: Option<FastestCompletion>,
    pub activity_breakdown: Vec<ActivityBreakdown>,
}

/// Everything a user has earned, plus the statistics it was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementSnapshot {
    pub points_based: Vec<Achievement>,
    pub activity_based: Vec<Achievement>,
    pub special_badges: Vec<Achievement>,
    pub statistics: AchievementStatistics,
}

impl AchievementSnapshot {
    pub fn earned(&self) -> impl Iterator<Item = &Achievement> {
        self.points_based
            .iter()
            .chain(self.activity_based.iter())
            .chain(self.special_badges.iter())
    }

    pub fn has(&self, id: &str) -> bool {
        self.earned().any(|a| a.id == id)
    }
}

/// A completed participation joined with the bounty it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedParticipation {
    pub participation_id: i32,
    pub bounty_id: i32,
    pub bounty_name: String,
    pub bounty_type: String,
    pub alloted_points: i64,
    pub points_earned: i64,
    pub berries_earned: i64,
    pub registered_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Engine input: a user's ledger history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerHistory {
    pub user_id: i32,
    /// Participations in any status
    pub total_participations: u64,
    pub completions: Vec<CompletedParticipation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: i32,
    pub name: String,
    pub completed_bounties: u64,
    pub total_points: i64,
    pub total_berries: i64,
}

/// Earned count, next milestone and the most recent earned achievements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementProgress {
    pub user_id: i32,
    pub achievement_count: u64,
    pub next_milestone: Option<NextMilestone>,
    pub recent: Vec<Achievement>,
}
