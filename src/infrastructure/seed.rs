use chrono::{Duration, Utc};
use sea_orm::*;

use crate::models::{bounty, reward, user};

/// Populate an empty ledger with users, bounties and rewards to play with.
/// Does nothing once any user exists.
pub async fn seed_demo_data(db: &DatabaseConnection) -> Result<(), DbErr> {
    if user::Entity::find().count(db).await? > 0 {
        tracing::info!("Ledger already has users, skipping demo seed");
        return Ok(());
    }

    let now = Utc::now();

    let users = [
        ("Ada Admin", "admin"),
        ("Felix Faculty", "faculty"),
        ("Sam Student", "student"),
        ("Riley Student", "student"),
        ("Noor Student", "student"),
    ];
    for (name, role) in users {
        user::ActiveModel {
            name: Set(name.to_owned()),
            role: Set(role.to_owned()),
            college_id: Set(Some(1)),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }

    let bounties = [
        ("Fix the login page", "coding", 1000, 100, Some(30), None),
        ("Design the event poster", "design", 600, 60, Some(14), Some(20)),
        ("Write the onboarding guide", "writing", 400, 40, Some(21), None),
        ("Survey campus study habits", "research", 800, 80, None, Some(10)),
        ("Port the CLI to Rust", "coding", 1500, 150, Some(60), None),
    ];
    for (name, kind, points, berries, days_open, capacity) in bounties {
        bounty::ActiveModel {
            name: Set(name.to_owned()),
            description: Set(Some(format!("Demo {} bounty", kind))),
            bounty_type: Set(kind.to_owned()),
            alloted_points: Set(points),
            alloted_berries: Set(berries),
            scheduled_date: Set(days_open.map(|d| now + Duration::days(d))),
            capacity: Set(capacity),
            is_active: Set(true),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }

    let rewards = [
        ("Campus cafe voucher", 50, Some(90)),
        ("Hoodie", 150, None),
        ("Conference ticket", 400, Some(180)),
    ];
    for (name, cost, days_valid) in rewards {
        reward::ActiveModel {
            name: Set(name.to_owned()),
            description: Set(None),
            berries_required: Set(cost),
            expiry_date: Set(days_valid.map(|d| now + Duration::days(d))),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }

    tracing::info!(
        "Seeded {} users, {} bounties and {} rewards",
        users.len(),
        bounties.len(),
        rewards.len()
    );

    Ok(())
}
