//! # Despacho de Requests
//! src/server/dispatcher.rs
//!
//! Convierte lo acumulado en una conexión en exactamente una respuesta y la
//! envía sin bloquear, de a lo que el socket acepte en cada vuelta del loop.
//! Las reglas se aplican en orden:
//!
//! 1. Request que no se puede parsear → 400
//! 2. POST: el resultado del upload puede cortar con 413, 500 o 400
//! 3. Path demasiado largo → 400, con `..` → 404
//! 4. Archivo que no se puede abrir → 404
//! 5. 200 con el archivo (o la hora, para `/cur_time`)

use super::registry::Connection;
use crate::http::multipart::{self, MAX_UPLOAD_SIZE};
use crate::http::{Method, Request, Response, StatusCode, UploadOutcome};
use crate::router::{self, BodySource, Router};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Respuesta decidida para un request, con lo que pasó en el camino
#[derive(Debug)]
pub struct Reply {
    pub response: Response,

    /// Path pedido, si el request se pudo parsear
    pub path: Option<String>,

    /// Resultado del upload (sólo POST)
    pub upload: Option<UploadOutcome>,
}

impl Reply {
    fn new(response: Response) -> Self {
        Self {
            response,
            path: None,
            upload: None,
        }
    }
}

/// Arma y envía respuestas
#[derive(Debug, Clone)]
pub struct Dispatcher {
    router: Router,
    upload_dir: PathBuf,
    write_timeout: Duration,
}

impl Dispatcher {
    pub fn new(router: Router, upload_dir: impl Into<PathBuf>, write_timeout: Duration) -> Self {
        Self {
            router,
            upload_dir: upload_dir.into(),
            write_timeout,
        }
    }

    /// Decide la respuesta para los bytes acumulados de una conexión
    pub fn respond(&self, buffer: &[u8], peer: SocketAddr) -> Reply {
        let request = match Request::parse(buffer) {
            Ok(request) => request,
            Err(e) => {
                debug!(%peer, error = %e, "request inválido");
                return Reply::new(Response::error(StatusCode::BadRequest));
            }
        };

        let mut reply = Reply::new(Response::error(StatusCode::BadRequest));
        reply.path = Some(request.path().to_string());

        if request.method() == Method::POST {
            let outcome = match self.upload(&request, buffer) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(%peer, error = %e, "falló la escritura del upload");
                    reply.response = Response::error(StatusCode::ServerError);
                    return reply;
                }
            };

            match &outcome {
                UploadOutcome::Stored(path) => info!(%peer, file = %path.display(), "archivo guardado"),
                UploadOutcome::NoFile => debug!(%peer, "POST sin archivo"),
                other => info!(%peer, outcome = ?other, "upload rechazado"),
            }

            let status = outcome.status_override();
            reply.upload = Some(outcome);
            if let Some(status) = status {
                reply.response = Response::error(status);
                return reply;
            }
        }

        reply.response = self.serve(request.path(), peer);
        reply
    }

    /// Respuesta 200 para un path, o el error que corresponda
    pub fn serve(&self, path: &str, peer: SocketAddr) -> Response {
        let resource = match self.router.lookup(path) {
            Ok(resource) => resource,
            Err(status) => {
                debug!(%peer, path, %status, "recurso rechazado");
                return Response::error(status);
            }
        };

        info!(%peer, path, "serve_resource");

        let response = Response::new(StatusCode::Ok).with_header("Connection", "close");
        let response = match resource.source {
            BodySource::File => response.with_file(resource.file, resource.len),
            BodySource::CurrentTime => response.with_body(router::current_time_text()),
        };
        response.with_header("Content-Type", resource.content_type)
    }

    /// Deja la respuesta pendiente en la conexión
    pub fn start(&self, conn: &mut Connection, response: Response, now: Instant) {
        conn.start_writing(response.into_outgoing(), now);
    }

    /// Escribe lo que el socket acepte sin bloquear
    ///
    /// `Ok(true)` cuando la respuesta salió completa. Una conexión que no
    /// está enviando no tiene nada pendiente.
    pub fn on_writable(&self, conn: &mut Connection, now: Instant) -> io::Result<bool> {
        let Some((stream, outgoing)) = conn.writing_parts() else {
            return Ok(true);
        };

        let before = outgoing.written();
        let done = outgoing.write_some(stream)?;
        let progressed = outgoing.written() > before;

        if progressed {
            conn.mark_written(now);
        }
        Ok(done)
    }

    /// Plazo para que el envío vuelva a avanzar; `None` si no está enviando
    pub fn write_deadline(&self, conn: &Connection) -> Option<Instant> {
        conn.is_writing().then(|| conn.last_write() + self.write_timeout)
    }

    fn upload(&self, request: &Request, buffer: &[u8]) -> Result<UploadOutcome, multipart::UploadError> {
        // El parser garantiza que todo POST trae boundary
        let Some(form) = request.multipart() else {
            return Ok(UploadOutcome::NoFile);
        };

        multipart::extract_and_store(
            &buffer[form.body_start()..],
            &form.final_delimiter(),
            &self.upload_dir,
            MAX_UPLOAD_SIZE,
        )
    }
}
