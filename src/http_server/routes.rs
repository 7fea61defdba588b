use super::handlers::{status, verification};
use crate::verifier::Verifier;
use actix_web::web;

pub fn configure_routes(service_config: &mut web::ServiceConfig, verifier: web::Data<Verifier>) {
    service_config
        .app_data(verifier)
        .route("/health", web::get().to(status::status))
        .service(web::scope("/api/v1").route("/verify", web::post().to(verification::verify)));
}
