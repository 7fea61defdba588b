pub mod handlers;
mod routes;

pub use self::routes::configure_routes;

use crate::{settings::ServerSettings, verifier::Verifier};
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;

pub async fn run(settings: ServerSettings, verifier: Arc<Verifier>) -> std::io::Result<()> {
    let verifier = web::Data::from(verifier);

    tracing::info!(addr = %settings.addr, "contract verifier server is starting");
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .configure(|service_config| configure_routes(service_config, verifier.clone()))
    })
    .bind(settings.addr)?
    .run()
    .await
}
