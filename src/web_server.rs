use actix_web::{App, HttpServer, dev::Server, middleware, web};
use anyhow::Context;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::routes::{json_error_handler, post_run_handler};
use crate::sandbox::Sandbox;

/// Largest accepted request body
pub const JSON_PAYLOAD_LIMIT: usize = 4 * 1024 * 1024;

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_PAYLOAD_LIMIT)
        .content_type_required(false)
        .error_handler(json_error_handler)
}

pub fn build_server(config: Config, shutdown_token: CancellationToken) -> anyhow::Result<Server> {
    let Config {
        server: server_config,
        workspace,
        languages,
    } = config;
    let sandbox = web::Data::new(Sandbox::build(&workspace, languages, shutdown_token)?);

    let bind_address = server_config
        .bind_address
        .unwrap_or("0.0.0.0".to_string());
    let bind_port = server_config.bind_port.unwrap_or(8080);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(sandbox.clone())
            .app_data(json_config())
            .wrap(middleware::Logger::default())
            .service(post_run_handler)
    })
    .disable_signals()
    .bind((bind_address.as_str(), bind_port))
    .with_context(|| format!("unable to bind {bind_address}:{bind_port}"))?
    .run();

    log::info!("Listening on {bind_address}:{bind_port}");
    Ok(server)
}
