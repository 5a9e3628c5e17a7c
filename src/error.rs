//! # Errores del Servidor
//! src/error.rs
//!
//! Errores fatales: sin socket de escucha o sin multiplexor el servidor no
//! puede seguir. Los errores de una conexión nunca llegan hasta aquí; se
//! registran y la conexión se libera.

use crate::server::multiplexer::MultiplexError;
use std::io;
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    /// No se pudo abrir el socket de escucha
    #[error("no se pudo escuchar en {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// `accept()` falló con un error no recuperable
    #[error("accept() falló: {0}")]
    Accept(#[source] io::Error),

    #[error(transparent)]
    Multiplex(#[from] MultiplexError),

    #[error("configuración inválida: {0}")]
    Config(String),

    #[error("error de I/O: {0}")]
    Io(#[from] io::Error),
}
