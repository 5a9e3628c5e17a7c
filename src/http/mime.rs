//! # Tipos MIME
//! src/http/mime.rs
//!
//! Tabla fija extensión → `Content-Type`. Lo que no está en la tabla se
//! sirve como `application/octet-stream`.

use std::path::Path;

/// Tipo por defecto para extensiones desconocidas
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const TABLE: &[(&str, &str)] = &[
    ("css", "text/css"),
    ("csv", "text/csv"),
    ("gif", "image/gif"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("ico", "image/x-icon"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("png", "image/png"),
    ("pdf", "application/pdf"),
    ("svg", "image/svg+xml"),
    ("txt", "text/plain"),
    ("zip", "application/zip"),
];

/// Retorna el `Content-Type` según la extensión del path
///
/// # Ejemplo
/// ```
/// use http_upload_server::http::mime::content_type;
///
/// assert_eq!(content_type("public/index.html"), "text/html");
/// assert_eq!(content_type("public/data.bin"), "application/octet-stream");
/// ```
pub fn content_type(path: impl AsRef<Path>) -> &'static str {
    let extension = match path.as_ref().extension().and_then(|ext| ext.to_str()) {
        Some(ext) => ext,
        None => return DEFAULT_CONTENT_TYPE,
    };

    TABLE
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(extension))
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}
