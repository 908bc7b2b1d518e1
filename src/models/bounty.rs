use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bounties")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    /// Activity type used for specialization achievements ('coding', 'design', ...)
    pub bounty_type: String,
    pub alloted_points: i64,
    pub alloted_berries: i64,
    /// Registrations are refused once this moment has passed
    pub scheduled_date: Option<DateTimeUtc>,
    /// Maximum number of non-cancelled participations, unlimited when NULL
    pub capacity: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::participation::Entity")]
    Participation,
}

impl Related<super::participation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A bounty whose scheduled date lies before `now` no longer accepts registrations.
    pub fn is_expired_at(&self, now: DateTimeUtc) -> bool {
        self.scheduled_date.is_some_and(|date| date < now)
    }
}
