//! # HTTP Upload Server
//! src/lib.rs
//!
//! Servidor HTTP de un solo hilo que atiende muchos clientes a la vez con
//! `poll()`, sirve archivos estáticos y recibe uploads `multipart/form-data`.
//!
//! ## Arquitectura
//!
//! El servidor está dividido en módulos especializados:
//! - `http`: Parsing de requests, multipart y armado de responses
//! - `server`: Registro de conexiones, multiplexor, acumulación y despacho
//! - `router`: Resolución de paths a archivos del directorio público
//! - `metrics`: Estadísticas de conexiones y respuestas
//! - `config`: Configuración por CLI y variables de entorno
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use http_upload_server::config::Config;
//! use http_upload_server::server::Server;
//!
//! let config = Config::default();
//! let mut server = Server::bind(&config).expect("Error al abrir el socket");
//! server.run().expect("Error fatal del servidor");
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod router;
pub mod server;

pub use error::{ServerError, ServerResult};
