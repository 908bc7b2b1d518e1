pub mod bounty;
pub mod participation;
pub mod reward;
pub mod reward_claim;
pub mod user;

pub use participation::ParticipationStatus;
