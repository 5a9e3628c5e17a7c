//! # Parsing de Requests
//! src/http/request.rs
//!
//! El servidor atiende exactamente un request por conexión, y lo parsea de
//! una sola pasada sobre los bytes acumulados. No es un parser HTTP general:
//!
//! 1. Busca el separador `\r\n\r\n` entre headers y body (si no está → 400)
//! 2. Reconoce el método por prefijo: `GET /` o `POST /` (otro → 400)
//! 3. El path va desde la `/` hasta el siguiente espacio, recortado en el
//!    separador si el espacio aparece después
//! 4. Para POST, el boundary es el texto entre `boundary=` y el siguiente
//!    `\r\n`; el delimitador final que se busca en el body es
//!    `--` + boundary + `--`
//!
//! La normalización del path (`/`, `/cur_time`, largo máximo, `..`) la hace
//! el router, no este módulo.

use super::find_subsequence;
use thiserror::Error;

/// Separador entre headers y body
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Largo máximo de un boundary según RFC 2046
pub const MAX_BOUNDARY_LEN: usize = 70;

/// Métodos HTTP soportados
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Obtener un recurso
    GET,

    /// POST - Subir un archivo y obtener un recurso
    POST,
}

impl Method {
    /// Prefijo con el que debe empezar el buffer para este método
    fn prefix(&self) -> &'static [u8] {
        match self {
            Method::GET => b"GET /",
            Method::POST => b"POST /",
        }
    }
}

/// Errores que pueden ocurrir durante el parsing.
///
/// Todos terminan en `400 Bad Request`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// No llegó el `\r\n\r\n` que cierra los headers
    #[error("request sin separador de headers")]
    MissingSeparator,

    /// El buffer no empieza con `GET /` ni `POST /`
    #[error("método no soportado")]
    UnsupportedMethod,

    /// No hay espacio después del path
    #[error("request line sin fin de path")]
    MissingPathTerminator,

    /// El path no es UTF-8 válido
    #[error("path no es UTF-8 válido")]
    InvalidPath,

    /// POST sin `boundary=` en los headers
    #[error("POST sin boundary multipart")]
    MissingBoundary,

    /// Boundary vacío, demasiado largo o no UTF-8
    #[error("boundary multipart inválido: {0}")]
    InvalidBoundary(String),
}

/// Datos multipart de un POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multipart {
    /// Token negociado en `Content-Type` (sin comillas)
    boundary: String,

    /// Offset del separador `\r\n\r\n`; el body se escanea desde aquí
    body_start: usize,
}

impl Multipart {
    /// Token del boundary tal como vino en el header
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Offset dentro del buffer donde empieza el escaneo del body
    pub fn body_start(&self) -> usize {
        self.body_start
    }

    /// Delimitador de cierre que se busca en el body: `--` + boundary + `--`
    ///
    /// # Ejemplo
    /// ```
    /// use http_upload_server::http::Request;
    ///
    /// let raw = b"POST / HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=XYZ\r\n\r\n";
    /// let request = Request::parse(raw).unwrap();
    /// assert_eq!(request.multipart().unwrap().final_delimiter(), b"--XYZ--");
    /// ```
    pub fn final_delimiter(&self) -> Vec<u8> {
        let mut delimiter = Vec::with_capacity(self.boundary.len() + 4);
        delimiter.extend_from_slice(b"--");
        delimiter.extend_from_slice(self.boundary.as_bytes());
        delimiter.extend_from_slice(b"--");
        delimiter
    }
}

/// Vista parseada de un request. No copia el body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Método HTTP (GET o POST)
    method: Method,

    /// Path pedido, sin normalizar (ej: "/", "/cur_time")
    path: String,

    /// Sólo presente en POST
    multipart: Option<Multipart>,
}

impl Request {
    /// Parsea un request desde los bytes acumulados de una conexión
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use http_upload_server::http::{Method, Request};
    ///
    /// let request = Request::parse(b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    ///
    /// assert_eq!(request.method(), Method::GET);
    /// assert_eq!(request.path(), "/index.html");
    /// ```
    pub fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        let separator =
            find_subsequence(buffer, HEADER_TERMINATOR).ok_or(ParseError::MissingSeparator)?;

        let method = if buffer.starts_with(Method::GET.prefix()) {
            Method::GET
        } else if buffer.starts_with(Method::POST.prefix()) {
            Method::POST
        } else {
            return Err(ParseError::UnsupportedMethod);
        };

        let path = Self::parse_path(buffer, method, separator)?;

        let multipart = match method {
            Method::GET => None,
            Method::POST => Some(Self::parse_multipart(buffer, separator)?),
        };

        Ok(Request {
            method,
            path,
            multipart,
        })
    }

    /// Extrae el path: desde la `/` del prefijo hasta el primer espacio,
    /// recortado en el separador de headers.
    fn parse_path(buffer: &[u8], method: Method, separator: usize) -> Result<String, ParseError> {
        // El prefijo incluye la '/', el path empieza un byte antes de su fin
        let start = method.prefix().len() - 1;

        let space = find_subsequence(&buffer[start..], b" ")
            .map(|offset| start + offset)
            .ok_or(ParseError::MissingPathTerminator)?;
        let end = space.min(separator);

        std::str::from_utf8(&buffer[start..end])
            .map(str::to_string)
            .map_err(|_| ParseError::InvalidPath)
    }

    /// Extrae el boundary de los headers de un POST
    fn parse_multipart(buffer: &[u8], separator: usize) -> Result<Multipart, ParseError> {
        // Incluye el \r\n de la última línea de headers
        let headers = &buffer[..separator + 2];

        let marker = b"boundary=";
        let value_start = find_subsequence(headers, marker)
            .map(|offset| offset + marker.len())
            .ok_or(ParseError::MissingBoundary)?;
        let value_end = find_subsequence(&headers[value_start..], b"\r\n")
            .map(|offset| value_start + offset)
            .ok_or(ParseError::MissingBoundary)?;

        let raw = std::str::from_utf8(&headers[value_start..value_end])
            .map_err(|_| ParseError::InvalidBoundary("no es UTF-8".to_string()))?;

        // Parámetros posteriores (`; charset=...`) no forman parte del token
        let boundary = raw
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .trim_matches('"');

        if boundary.is_empty() {
            return Err(ParseError::InvalidBoundary("vacío".to_string()));
        }
        if boundary.len() > MAX_BOUNDARY_LEN {
            return Err(ParseError::InvalidBoundary(format!(
                "{} bytes (máximo {})",
                boundary.len(),
                MAX_BOUNDARY_LEN
            )));
        }

        Ok(Multipart {
            boundary: boundary.to_string(),
            body_start: separator,
        })
    }

    // === Métodos públicos para acceder a los campos ===

    /// Obtiene el método HTTP del request
    pub fn method(&self) -> Method {
        self.method
    }

    /// Obtiene el path del request, tal como vino
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Datos multipart (sólo POST)
    pub fn multipart(&self) -> Option<&Multipart> {
        self.multipart.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // ==================== GET ====================

    #[test]
    fn test_parse_simple_get() {
        let request = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.path(), "/");
        assert!(request.multipart().is_none());
    }

    #[rstest]
    #[case(b"GET /index.html HTTP/1.1\r\n\r\n".as_slice(), "/index.html")]
    #[case(b"GET /cur_time HTTP/1.1\r\nHost: x\r\n\r\n".as_slice(), "/cur_time")]
    #[case(b"GET /a/b/c.png HTTP/1.0\r\nUser-Agent: t\r\n\r\n".as_slice(), "/a/b/c.png")]
    #[case(b"GET /query?x=1 HTTP/1.1\r\n\r\n".as_slice(), "/query?x=1")]
    fn test_parse_get_paths(#[case] raw: &[u8], #[case] expected: &str) {
        let request = Request::parse(raw).unwrap();
        assert_eq!(request.path(), expected);
    }

    #[test]
    fn test_path_cut_at_separator_when_space_comes_later() {
        // El primer espacio está en el body: el path se corta en el separador
        let request = Request::parse(b"GET /nospace\r\n\r\nhello world").unwrap();
        assert_eq!(request.path(), "/nospace");
    }

    #[test]
    fn test_get_without_any_space() {
        let result = Request::parse(b"GET /nospace\r\n\r\n");
        assert_eq!(result, Err(ParseError::MissingPathTerminator));
    }

    // ==================== Errores ====================

    #[rstest]
    #[case(b"".as_slice())]
    #[case(b"GET / HTTP/1.1\r\n".as_slice())]
    #[case(b"GET / HTTP/1.1\r\nHost: x\r\n".as_slice())]
    fn test_missing_separator(#[case] raw: &[u8]) {
        assert_eq!(Request::parse(raw), Err(ParseError::MissingSeparator));
    }

    #[rstest]
    #[case(b"HEAD / HTTP/1.1\r\n\r\n".as_slice())]
    #[case(b"PUT /x HTTP/1.1\r\n\r\n".as_slice())]
    #[case(b"get / HTTP/1.1\r\n\r\n".as_slice())]
    #[case(b"GET index.html HTTP/1.1\r\n\r\n".as_slice())]
    #[case(b"\x00\x01\x02garbage\r\n\r\n".as_slice())]
    fn test_unsupported_method(#[case] raw: &[u8]) {
        assert_eq!(Request::parse(raw), Err(ParseError::UnsupportedMethod));
    }

    #[test]
    fn test_invalid_utf8_path() {
        let result = Request::parse(b"GET /\xff\xfe HTTP/1.1\r\n\r\n");
        assert_eq!(result, Err(ParseError::InvalidPath));
    }

    // ==================== POST ====================

    #[test]
    fn test_parse_post_boundary() {
        let raw = b"POST /index.html HTTP/1.1\r\n\
                    Content-Type: multipart/form-data; boundary=----WebKitFormBoundaryabc\r\n\
                    Content-Length: 10\r\n\r\nbody";
        let request = Request::parse(raw).unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.path(), "/index.html");

        let multipart = request.multipart().unwrap();
        assert_eq!(multipart.boundary(), "----WebKitFormBoundaryabc");
        assert_eq!(multipart.final_delimiter(), b"------WebKitFormBoundaryabc--".to_vec());
        assert_eq!(&raw[multipart.body_start()..multipart.body_start() + 4], b"\r\n\r\n");
    }

    #[rstest]
    #[case("boundary=\"quoted\"", "quoted")]
    #[case("boundary=abc; charset=utf-8", "abc")]
    #[case("boundary=abc ", "abc")]
    fn test_boundary_variants(#[case] param: &str, #[case] expected: &str) {
        let raw = format!("POST / HTTP/1.1\r\nContent-Type: multipart/form-data; {}\r\n\r\n", param);
        let request = Request::parse(raw.as_bytes()).unwrap();
        assert_eq!(request.multipart().unwrap().boundary(), expected);
    }

    #[test]
    fn test_post_without_boundary() {
        let result = Request::parse(b"POST / HTTP/1.1\r\nContent-Type: text/plain\r\n\r\n");
        assert_eq!(result, Err(ParseError::MissingBoundary));
    }

    #[test]
    fn test_boundary_in_body_is_ignored() {
        let raw = b"POST / HTTP/1.1\r\nHost: x\r\n\r\nboundary=abc\r\n";
        assert_eq!(Request::parse(raw), Err(ParseError::MissingBoundary));
    }

    #[test]
    fn test_boundary_too_long() {
        let raw = format!(
            "POST / HTTP/1.1\r\nContent-Type: multipart/form-data; boundary={}\r\n\r\n",
            "a".repeat(MAX_BOUNDARY_LEN + 1)
        );
        let result = Request::parse(raw.as_bytes());
        assert!(matches!(result, Err(ParseError::InvalidBoundary(_))));
    }

    #[test]
    fn test_empty_boundary() {
        let raw = b"POST / HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=\r\n\r\n";
        assert!(matches!(Request::parse(raw), Err(ParseError::InvalidBoundary(_))));
    }
}
