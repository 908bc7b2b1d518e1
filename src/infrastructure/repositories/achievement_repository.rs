//! SeaORM implementation of AchievementRepository

use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use std::collections::HashMap;

use crate::domain::{
    AchievementRepository, CompletedParticipation, LeaderboardEntry, LedgerError, LedgerHistory,
};
use crate::models::bounty::Entity as BountyEntity;
use crate::models::participation::{Column, Entity as ParticipationEntity, ParticipationStatus};
use crate::models::user::{self, Entity as UserEntity};

/// SeaORM-based implementation of AchievementRepository
pub struct SeaOrmAchievementRepository {
    db: DatabaseConnection,
}

impl SeaOrmAchievementRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[derive(Default)]
struct Totals {
    completed: u64,
    points: i64,
    berries: i64,
}

#[async_trait]
impl AchievementRepository for SeaOrmAchievementRepository {
    async fn ledger_history(&self, user_id: i32) -> Result<LedgerHistory, LedgerError> {
        UserEntity::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(LedgerError::UserNotFound(user_id))?;

        let total_participations = ParticipationEntity::find()
            .filter(Column::UserId.eq(user_id))
            .count(&self.db)
            .await?;

        let completed = ParticipationEntity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Status.eq(ParticipationStatus::Completed))
            .order_by_asc(Column::CompletedAt)
            .order_by_asc(Column::Id)
            .find_also_related(BountyEntity)
            .all(&self.db)
            .await?;

        let completions = completed
            .into_iter()
            .map(|(p, bounty)| {
                let (bounty_name, bounty_type, alloted_points) = bounty
                    .map(|b| (b.name, b.bounty_type, b.alloted_points))
                    .unwrap_or_else(|| ("Unknown".to_string(), "unknown".to_string(), 0));

                CompletedParticipation {
                    participation_id: p.id,
                    bounty_id: p.bounty_id,
                    bounty_name,
                    bounty_type,
                    alloted_points,
                    points_earned: p.points_earned,
                    berries_earned: p.berries_earned,
                    registered_at: p.registered_at,
                    completed_at: p.completed_at,
                }
            })
            .collect();

        Ok(LedgerHistory {
            user_id,
            total_participations,
            completions,
        })
    }

    async fn leaderboard(&self, limit: u64) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        let rows: Vec<(i32, i64, i64)> = ParticipationEntity::find()
            .select_only()
            .column(Column::UserId)
            .column(Column::PointsEarned)
            .column(Column::BerriesEarned)
            .filter(Column::Status.eq(ParticipationStatus::Completed))
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut totals: HashMap<i32, Totals> = HashMap::new();
        for (user_id, points, berries) in rows {
            let entry = totals.entry(user_id).or_default();
            entry.completed += 1;
            entry.points += points;
            entry.berries += berries;
        }

        let mut ranked: Vec<(i32, Totals)> = totals.into_iter().collect();
        ranked.sort_by(|(a_id, a), (b_id, b)| {
            b.points
                .cmp(&a.points)
                .then_with(|| b.berries.cmp(&a.berries))
                .then_with(|| a_id.cmp(b_id))
        });
        ranked.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

        let ids: Vec<i32> = ranked.iter().map(|(id, _)| *id).collect();
        let names: HashMap<i32, String> = UserEntity::find()
            .filter(user::Column::Id.is_in(ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|u| (u.id, u.name))
            .collect();

        Ok(ranked
            .into_iter()
            .enumerate()
            .map(|(i, (user_id, t))| LeaderboardEntry {
                rank: i as u32 + 1,
                user_id,
                name: names
                    .get(&user_id)
                    .cloned()
                    .unwrap_or_else(|| "Unknown".to_string()),
                completed_bounties: t.completed,
                total_points: t.points,
                total_berries: t.berries,
            })
            .collect())
    }
}
