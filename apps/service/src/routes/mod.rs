use actix_web::web;

mod check;
mod health;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(health::routes).configure(check::routes);
}
