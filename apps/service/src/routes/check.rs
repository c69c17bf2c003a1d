use actix_web::{HttpResponse, Responder, get, web};
use tracing::error;

use crate::state::AppState;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(check_route);
}

/// Run every check now, store the result directly and return it as JSON.
///
/// The save is not retried; a failure is logged and the result is still
/// returned.
#[get("/check")]
pub async fn check_route(state: web::Data<AppState>) -> impl Responder {
    let ctx = state.root.child();
    let result = state.orchestrator.run_once(&ctx).await;
    if let Err(e) = state.store.save_check_result(&ctx, &result).await {
        error!(error = %e, "saving check results");
    }
    HttpResponse::Ok().json(result)
}
