//! src/startup.rs
use std::net::TcpListener;

use actix_web::dev::Server;
use actix_web::web::ServiceConfig;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use tracing_actix_web::TracingLogger;

use crate::configuration::ApplicationSettings;
use crate::environment;

/// A configured server and the port it is bound to. Binding to port 0 picks
/// a free port, which `port()` reports; tests rely on this.
pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run(self) -> std::io::Result<()> {
        self.server.await
    }
}

/// Bind a listener per the application settings and serve the caller's
/// routes behind request tracing and a `/health_check` endpoint.
///
/// The `configure` closure receives the actix `ServiceConfig` and registers
/// routes and shared state the usual way.
pub fn build<F>(settings: &ApplicationSettings, configure: F) -> Result<Application, std::io::Error>
where
    F: Fn(&mut ServiceConfig) + Send + Clone + 'static,
{
    let address = format!("{}:{}", settings.host, settings.port);
    let listener = TcpListener::bind(address)?;
    let port = listener.local_addr()?.port();

    let workers = settings.workers.unwrap_or_else(environment::cpu_count).max(1);
    let server = run(listener, workers, configure)?;

    Ok(Application { port, server })
}

pub fn run<F>(listener: TcpListener, workers: usize, configure: F) -> Result<Server, std::io::Error>
where
    F: Fn(&mut ServiceConfig) + Send + Clone + 'static,
{
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .configure(configure.clone())
    })
    .workers(workers)
    .listen(listener)?
    .run();

    Ok(server)
}

async fn health_check() -> impl Responder {
    HttpResponse::Ok()
}
