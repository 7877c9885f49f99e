use axum::Router;

use crate::{billing, ledger};

pub fn api_routes() -> Router {
    Router::new()
        .merge(billing::api::routes())
        .merge(ledger::api::routes())
}
