//! # Resolución de Recursos
//! src/router/mod.rs
//!
//! Mapea el path de un request a un recurso del directorio público.
//!
//! ```text
//! "/"          → /index.html
//! "/cur_time"  → /index.html, pero el body es la hora actual
//! len > 100    → 400 Bad Request
//! contiene ".."→ 404 Not Found
//! no existe    → 404 Not Found
//! ```
//!
//! Las reglas se aplican en ese orden.

use crate::http::{mime, StatusCode};
use chrono::{DateTime, Local};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Largo máximo de un path (después de normalizar)
pub const MAX_PATH_LEN: usize = 100;

/// Path al que se mapean `/` y `/cur_time`
pub const INDEX_PATH: &str = "/index.html";

/// Path especial que devuelve la hora del servidor
pub const CURRENT_TIME_PATH: &str = "/cur_time";

/// Qué se envía como body en un 200
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySource {
    /// El contenido del archivo
    File,

    /// La hora actual en texto
    CurrentTime,
}

/// Path ya normalizado y validado
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Path relativo al directorio público, siempre empieza con `/`
    pub path: String,

    /// Origen del body
    pub source: BodySource,
}

/// Archivo abierto listo para servir
#[derive(Debug)]
pub struct Resource {
    /// Archivo abierto en modo lectura
    pub file: File,

    /// Tamaño en bytes
    pub len: u64,

    /// `Content-Type` según la extensión
    pub content_type: &'static str,

    /// Origen del body
    pub source: BodySource,
}

/// Router sobre un directorio público
#[derive(Debug, Clone)]
pub struct Router {
    /// Directorio desde el que se sirven archivos
    root: PathBuf,
}

impl Router {
    /// Crea un router que sirve archivos desde `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Normaliza y valida un path
    ///
    /// # Ejemplo
    /// ```
    /// use http_upload_server::router::{BodySource, Router};
    ///
    /// let router = Router::new("public");
    /// let route = router.resolve("/cur_time").unwrap();
    ///
    /// assert_eq!(route.path, "/index.html");
    /// assert_eq!(route.source, BodySource::CurrentTime);
    /// ```
    pub fn resolve(&self, path: &str) -> Result<Route, StatusCode> {
        let (path, source) = match path {
            "/" => (INDEX_PATH, BodySource::File),
            CURRENT_TIME_PATH => (INDEX_PATH, BodySource::CurrentTime),
            other => (other, BodySource::File),
        };

        if path.len() > MAX_PATH_LEN {
            return Err(StatusCode::BadRequest);
        }

        if path.contains("..") {
            return Err(StatusCode::NotFound);
        }

        Ok(Route {
            path: path.to_string(),
            source,
        })
    }

    /// Abre el archivo de una ruta ya validada
    pub fn open(&self, route: &Route) -> Result<Resource, StatusCode> {
        let full_path = self.full_path(&route.path);

        let (file, len) = open_for_read(&full_path).map_err(|_| StatusCode::NotFound)?;

        Ok(Resource {
            file,
            len,
            content_type: mime::content_type(&full_path),
            source: route.source,
        })
    }

    /// `resolve` + `open` en un paso
    pub fn lookup(&self, path: &str) -> Result<Resource, StatusCode> {
        let route = self.resolve(path)?;
        self.open(&route)
    }

    /// Concatena el directorio público con el path del request
    fn full_path(&self, path: &str) -> PathBuf {
        // El path empieza con '/', `join` lo trataría como absoluto
        self.root.join(path.trim_start_matches('/'))
    }
}

/// Abre un archivo regular y retorna su tamaño
///
/// Directorios y archivos especiales cuentan como no encontrados.
pub fn open_for_read(path: &Path) -> io::Result<(File, u64)> {
    let file = File::open(path)?;
    let metadata = file.metadata()?;

    if !metadata.is_file() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "no es un archivo regular"));
    }

    Ok((file, metadata.len()))
}

/// Hora actual del servidor en el formato de `ctime(3)`
///
/// Formato: `"Sun Oct 18 12:00:00 2026\n"`
pub fn current_time_text() -> String {
    format_ctime(&Local::now())
}

fn format_ctime(time: &DateTime<Local>) -> String {
    time.format("%a %b %e %H:%M:%S %Y\n").to_string()
}
