//! # Módulo HTTP
//! src/http/mod.rs
//!
//! Todo lo que toca el formato de cable:
//!
//! - Parsing de la request line y del boundary multipart
//! - Extracción del archivo subido en un body `multipart/form-data`
//! - Construcción de las responses (cuatro errores fijos y el 200)
//! - Tabla de tipos MIME por extensión
//!
//! ## Formato de Request aceptado
//!
//! ```text
//! POST /index.html HTTP/1.1\r\n
//! Content-Type: multipart/form-data; boundary=XYZ\r\n
//! \r\n
//! --XYZ\r\n
//! Content-Disposition: form-data; name="file"; filename="a.txt"\r\n
//! Content-Type: text/plain\r\n
//! \r\n
//! hola\r\n
//! --XYZ--\r\n
//! ```
//!
//! Todo el escaneo se hace sobre slices de bytes con búsquedas acotadas;
//! nunca se indexa fuera del buffer recibido.

pub mod mime;       // Extensión → Content-Type
pub mod multipart;  // Extracción del archivo subido
pub mod request;    // Parsing de la request line y del boundary
pub mod response;   // Construcción de responses
pub mod status;     // Códigos de estado HTTP

pub use multipart::{UploadError, UploadOutcome};
pub use request::{Method, ParseError, Request};
pub use response::{Outgoing, Response};
pub use status::StatusCode;

/// Busca la primera aparición de `needle` dentro de `haystack`
///
/// Retorna el offset donde empieza la coincidencia. Un `needle` vacío
/// nunca coincide.
///
/// # Ejemplo
/// ```
/// use http_upload_server::http::find_subsequence;
///
/// assert_eq!(find_subsequence(b"GET / HTTP/1.1\r\n\r\n", b"\r\n\r\n"), Some(14));
/// assert_eq!(find_subsequence(b"abc", b"z"), None);
/// ```
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
