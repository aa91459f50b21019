use axum::extract::State;
use axum::Json;

use super::AppState;
use crate::auth::AuthUser;
use crate::db::queries;
use crate::error::ApiResult;
use crate::services::pricing::round_money;
use crate::types::Stats;

/// GET /api/stats
pub async fn handle_stats(State(state): State<AppState>, _user: AuthUser) -> ApiResult<Json<Stats>> {
    let suppliers = queries::supplier::count_suppliers(&state.pool).await?;
    let (products, total_value) = queries::product::catalog_totals(&state.pool).await?;
    let quotes = queries::quote::count_quotes(&state.pool).await?;

    Ok(Json(Stats {
        suppliers,
        products,
        quotes,
        total_value: round_money(total_value),
    }))
}
