//! Repository implementations using SeaORM

pub mod achievement_repository;

pub use achievement_repository::SeaOrmAchievementRepository;
