use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a user's engagement with a bounty.
///
/// `registered` is the only non-terminal state. Nothing moves a participation
/// on its own: a passed scheduled date only blocks new registrations.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum ParticipationStatus {
    #[sea_orm(string_value = "registered")]
    Registered,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl ParticipationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipationStatus::Registered => "registered",
            ParticipationStatus::Completed => "completed",
            ParticipationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ParticipationStatus::Registered)
    }

    /// Only `registered -> completed` and `registered -> cancelled` exist.
    pub fn can_transition_to(&self, next: ParticipationStatus) -> bool {
        matches!(
            (self, next),
            (ParticipationStatus::Registered, ParticipationStatus::Completed)
                | (ParticipationStatus::Registered, ParticipationStatus::Cancelled)
        )
    }
}

impl fmt::Display for ParticipationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "participations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub bounty_id: i32,
    pub status: ParticipationStatus,
    pub points_earned: i64,
    pub berries_earned: i64,
    pub registered_at: DateTimeUtc,
    pub completed_at: Option<DateTimeUtc>,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::bounty::Entity",
        from = "Column::BountyId",
        to = "super::bounty::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Bounty,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::bounty::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bounty.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
