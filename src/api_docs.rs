use crate::api;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health::health_check,
        api::participation::register,
        api::rewards::claim_reward,
        api::user::get_my_balance,
    ),
    tags(
        (name = "berries-ledger", description = "Bounties & Berries ledger API")
    )
)]
pub struct ApiDoc;
