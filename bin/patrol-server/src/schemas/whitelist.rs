//! Wire schemas for the whitelist (task matrix) endpoints.

use patrol_core::WhitelistField;
use serde::Deserialize;
use utoipa::ToSchema;

/// Body of `PATCH /api/whitelist/{id}`: one scalar field update.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateEntryRequest {
    #[schema(value_type = String, example = "productName")]
    pub field: WhitelistField,
    pub value: String,
}

/// Body of `POST /api/whitelist/{id}/shops`. Blank input is not an error:
/// the manager trims it and answers `added: false`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AddShopRequest {
    pub shop: String,
}
