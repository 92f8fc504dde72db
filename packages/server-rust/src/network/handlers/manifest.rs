//! Operation catalog endpoint.

use axum::extract::State;
use axum::Json;
use callwire_core::Manifest;

use super::AppState;

/// `GET /manifest` -- describes this server instance and the operation
/// kinds it will accept, sorted by kind.
pub async fn manifest_handler(State(state): State<AppState>) -> Json<Manifest> {
    Json(Manifest {
        name: env!("CARGO_PKG_NAME").to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        description: env!("CARGO_PKG_DESCRIPTION").to_owned(),
        operations: state.engine.operations().descriptors(),
    })
}
