//! # HTTP Upload Server - Entry Point
//! src/main.rs
//!
//! Punto de entrada del servidor. Lee la configuración, instala logging y
//! señales, y corre el loop hasta SIGINT/SIGTERM.

use http_upload_server::config::Config;
use http_upload_server::logging;
use http_upload_server::server::{signal, Server};
use tracing::{error, warn};

fn main() {
    let config = Config::new();

    if let Err(e) = config.validate() {
        eprintln!("💥 Configuración inválida: {}", e);
        std::process::exit(1);
    }

    config.print_summary();
    logging::init(&config.log_level);

    if let Err(e) = signal::install() {
        warn!(error = %e, "no se pudieron instalar los handlers de señales");
    }

    let mut server = match Server::bind(&config) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "no se pudo iniciar el servidor");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        error!(error = %e, "error fatal");
        std::process::exit(1);
    }
}
