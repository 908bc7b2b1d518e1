//! Achievement Calculation Engine
//!
//! A pure function of the catalog and a user's ledger history. No clock, no
//! randomness and no I/O: the same history always yields the same snapshot.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;

use crate::domain::{
    Achievement, AchievementConfig, AchievementKind, AchievementSnapshot, AchievementStatistics,
    ActivityBreakdown, CompletedParticipation, FastestCompletion, LedgerHistory, NextMilestone,
};

/// Whole percent of `part` in `whole`, rounded half up
pub fn percent(part: i64, whole: i64) -> i64 {
    if whole <= 0 {
        return 0;
    }
    (200 * part + whole) / (2 * whole)
}

fn round_hours(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

fn completion_hours(c: &CompletedParticipation) -> Option<f64> {
    let completed_at = c.completed_at?;
    let millis = (completed_at - c.registered_at).num_milliseconds().max(0);
    Some(millis as f64 / 3_600_000.0)
}

/// Length of the run of completions, newest first, where each falls exactly one
/// calendar day before the previous one. A second completion on the same day ends the run.
pub fn current_streak(completion_times: &[DateTime<Utc>]) -> u32 {
    let mut days: Vec<NaiveDate> = completion_times.iter().map(|t| t.date_naive()).collect();
    days.sort_unstable_by(|a, b| b.cmp(a));

    let mut streak = 0;
    let mut previous: Option<NaiveDate> = None;
    for day in days {
        if let Some(prev) = previous
            && prev.checked_sub_signed(Duration::days(1)) != Some(day)
        {
            break;
        }
        streak += 1;
        previous = Some(day);
    }
    streak
}

struct Totals {
    points: i64,
    berries: i64,
}

fn totals(completions: &[CompletedParticipation]) -> Totals {
    Totals {
        points: completions.iter().map(|c| c.points_earned).sum(),
        berries: completions.iter().map(|c| c.berries_earned).sum(),
    }
}

fn activity_breakdown(completions: &[CompletedParticipation]) -> Vec<ActivityBreakdown> {
    let mut by_type: BTreeMap<&str, ActivityBreakdown> = BTreeMap::new();
    for c in completions {
        let entry = by_type
            .entry(c.bounty_type.as_str())
            .or_insert_with(|| ActivityBreakdown {
                activity_type: c.bounty_type.clone(),
                count: 0,
                points: 0,
                berries: 0,
            });
        entry.count += 1;
        entry.points += c.points_earned;
        entry.berries += c.berries_earned;
    }

    let mut breakdown: Vec<ActivityBreakdown> = by_type.into_values().collect();
    breakdown.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| a.activity_type.cmp(&b.activity_type))
    });
    breakdown
}

fn points_based(config: &AchievementConfig, ordered: &[CompletedParticipation]) -> Vec<Achievement> {
    let total = totals(ordered).points;

    config
        .point_tiers
        .iter()
        .filter(|tier| total >= tier.threshold)
        .map(|tier| {
            // Completion whose cumulative total first crossed the tier
            let mut running = 0;
            let earned_at = ordered.iter().find_map(|c| {
                running += c.points_earned;
                (running >= tier.threshold).then_some(c.completed_at).flatten()
            });

            Achievement {
                id: tier.id.clone(),
                name: tier.name.clone(),
                description: tier.description.clone(),
                badge: tier.badge.clone(),
                kind: AchievementKind::PointsBased,
                threshold: Some(tier.threshold),
                activity_type: None,
                percentage: None,
                streak_days: None,
                completion_hours: None,
                earned_at,
            }
        })
        .collect()
}

fn activity_based(
    config: &AchievementConfig,
    total_points: i64,
    breakdown: &[ActivityBreakdown],
) -> Vec<Achievement> {
    let mut earned = Vec::new();

    for rule in &config.activity_rules {
        if total_points <= 0 || total_points < rule.min_total_points {
            continue;
        }
        let activity_points = breakdown
            .iter()
            .find(|b| b.activity_type == rule.activity_type)
            .map(|b| b.points)
            .unwrap_or(0);
        let share = percent(activity_points, total_points);

        if share >= rule.threshold_percent {
            earned.push(Achievement {
                id: rule.id.clone(),
                name: rule.name.clone(),
                description: rule.description.clone(),
                badge: rule.badge.clone(),
                kind: AchievementKind::ActivityBased,
                threshold: Some(rule.threshold_percent),
                activity_type: Some(rule.activity_type.clone()),
                percentage: Some(share),
                streak_days: None,
                completion_hours: None,
                earned_at: None,
            });
        }
    }

    earned
}

fn special(
    config: &AchievementConfig,
    ordered: &[CompletedParticipation],
    streak: u32,
    fastest: Option<(&CompletedParticipation, f64)>,
) -> Vec<Achievement> {
    let rules = &config.special;
    let mut earned = Vec::new();

    let plain = |info: &crate::domain::BadgeInfo| Achievement {
        id: info.id.clone(),
        name: info.name.clone(),
        description: info.description.clone(),
        badge: info.badge.clone(),
        kind: AchievementKind::SpecialBadge,
        threshold: None,
        activity_type: None,
        percentage: None,
        streak_days: None,
        completion_hours: None,
        earned_at: None,
    };

    if let Some(first) = ordered.first() {
        earned.push(Achievement {
            earned_at: first.completed_at,
            ..plain(&rules.first_steps)
        });
    }

    if let Some(perfect) = ordered
        .iter()
        .find(|c| c.points_earned == c.alloted_points)
    {
        earned.push(Achievement {
            earned_at: perfect.completed_at,
            ..plain(&rules.flawless_victory)
        });
    }

    if streak >= rules.consistency_threshold_days {
        earned.push(Achievement {
            threshold: Some(i64::from(rules.consistency_threshold_days)),
            streak_days: Some(streak),
            earned_at: ordered.iter().rev().find_map(|c| c.completed_at),
            ..plain(&rules.consistency_king)
        });
    }

    if let Some((c, hours)) = fastest
        && hours <= rules.lightning_fast_max_hours
    {
        earned.push(Achievement {
            completion_hours: Some(round_hours(hours)),
            earned_at: c.completed_at,
            ..plain(&rules.lightning_fast)
        });
    }

    earned
}

fn next_milestone(config: &AchievementConfig, total_points: i64) -> Option<NextMilestone> {
    config
        .point_tiers
        .iter()
        .find(|tier| tier.threshold > total_points)
        .map(|tier| NextMilestone {
            id: tier.id.clone(),
            name: tier.name.clone(),
            threshold: tier.threshold,
            remaining: tier.threshold - total_points,
            progress: percent(total_points.max(0), tier.threshold).clamp(0, 100),
        })
}

/// Compute a user's full achievement snapshot from their ledger history
pub fn calculate(config: &AchievementConfig, history: &LedgerHistory) -> AchievementSnapshot {
    // Canonical order so input order never leaks into the result
    let mut ordered = history.completions.clone();
    ordered.sort_by(|a, b| {
        a.completed_at
            .cmp(&b.completed_at)
            .then_with(|| a.participation_id.cmp(&b.participation_id))
    });

    let totals = totals(&ordered);
    let breakdown = activity_breakdown(&ordered);

    let completion_times: Vec<DateTime<Utc>> =
        ordered.iter().filter_map(|c| c.completed_at).collect();
    let streak = current_streak(&completion_times);

    let mut fastest: Option<(&CompletedParticipation, f64)> = None;
    for c in &ordered {
        if let Some(hours) = completion_hours(c)
            && fastest.is_none_or(|(_, best)| hours < best)
        {
            fastest = Some((c, hours));
        }
    }

    let points_based = points_based(config, &ordered);
    let activity_based = activity_based(config, totals.points, &breakdown);
    let special_badges = special(config, &ordered, streak, fastest);

    let achievement_count = (points_based.len() + activity_based.len() + special_badges.len()) as u64;

    let statistics = AchievementStatistics {
        total_points: totals.points,
        total_berries: totals.berries,
        bounty_count: history.total_participations,
        completed_count: ordered.len() as u64,
        achievement_count,
        next_milestone: next_milestone(config, totals.points),
        current_streak: streak,
        fastest_completion: fastest.map(|(c, hours)| FastestCompletion {
            bounty_name: c.bounty_name.clone(),
            bounty_type: c.bounty_type.clone(),
            hours: round_hours(hours),
            points: c.points_earned,
        }),
        activity_breakdown: breakdown,
    };

    AchievementSnapshot {
        points_based,
        activity_based,
        special_badges,
        statistics,
    }
}
