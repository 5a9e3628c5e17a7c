//! # Construcción de Respuestas HTTP
//! src/http/response.rs
//!
//! Toda response cierra la conexión. Hay exactamente cuatro errores fijos,
//! byte a byte iguales a los que el servidor siempre ha enviado:
//!
//! ```text
//! HTTP/1.1 400 Bad Request\r\n
//! Connection: close\r\n
//! Content-Length: 11\r\n
//! \r\n
//! Bad Request
//! ```
//!
//! y un 200 cuyo body puede ser un texto (la hora actual) o un archivo que
//! se transmite en bloques de tamaño fijo.
//!
//! ## Ejemplo de uso
//!
//! ```
//! use http_upload_server::http::{Response, StatusCode};
//!
//! let mut outgoing = Response::error(StatusCode::NotFound).into_outgoing();
//! let mut out = Vec::new();
//! assert!(outgoing.write_some(&mut out).unwrap());
//! assert!(out.ends_with(b"\r\n\r\nNot Found"));
//! ```

use super::StatusCode;
use std::fs::File;
use std::io::{self, Read, Write};

/// Tamaño de cada bloque al transmitir un archivo
pub const CHUNK_SIZE: usize = 4096;

/// Origen del body de una response
#[derive(Debug)]
pub enum Body {
    /// Sin body
    Empty,

    /// Bytes en memoria (errores fijos, hora actual)
    Bytes(Vec<u8>),

    /// Archivo abierto; se lee en bloques de `CHUNK_SIZE`
    File(File),
}

/// Una response HTTP/1.1 lista para enviar
#[derive(Debug)]
pub struct Response {
    /// Código de estado HTTP
    status: StatusCode,

    /// Headers en el orden en que se envían
    headers: Vec<(String, String)>,

    /// Cuerpo de la respuesta
    body: Body,
}

impl Response {
    /// Crea una nueva respuesta sin headers ni body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    /// Agrega un header. Si ya existe, se sobrescribe en su misma posición.
    ///
    /// # Ejemplo
    /// ```
    /// use http_upload_server::http::{Response, StatusCode};
    ///
    /// let response = Response::new(StatusCode::Ok)
    ///     .with_header("Content-Type", "text/html");
    /// assert_eq!(response.header("Content-Type"), Some("text/html"));
    /// ```
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    /// Versión mutable de `with_header`
    pub fn add_header(&mut self, name: &str, value: &str) {
        match self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Establece el body desde bytes en memoria y agrega `Content-Length`
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.add_header("Content-Length", &body.len().to_string());
        self.body = Body::Bytes(body);
        self
    }

    /// Establece un archivo como body. `len` es su tamaño en disco y va en
    /// `Content-Length`.
    pub fn with_file(mut self, file: File, len: u64) -> Self {
        self.add_header("Content-Length", &len.to_string());
        self.body = Body::File(file);
        self
    }

    /// Crea una de las cuatro respuestas de error fijas
    ///
    /// # Ejemplo
    /// ```
    /// use http_upload_server::http::{Response, StatusCode};
    ///
    /// let response = Response::error(StatusCode::PayloadTooLarge);
    /// assert_eq!(response.header("Content-Length"), Some("31"));
    /// ```
    pub fn error(status: StatusCode) -> Self {
        let message = match status {
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::PayloadTooLarge => "Sorry, Request Entity Too Large",
            StatusCode::ServerError => "Sorry, File Name Collision",
            StatusCode::Ok => "",
        };
        Self::new(status)
            .with_header("Connection", "close")
            .with_body(message)
    }

    /// Status line y headers, terminados con la línea vacía
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut result = format!("HTTP/1.1 {}\r\n", self.status).into_bytes();

        for (name, value) in &self.headers {
            result.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }

        result.extend_from_slice(b"\r\n");
        result
    }

    /// Convierte la response en un envío que avanza de a partes
    ///
    /// El head (y el body si está en memoria) queda en un buffer; un archivo
    /// se lee de a bloques de `CHUNK_SIZE` a medida que el socket acepta.
    pub fn into_outgoing(self) -> Outgoing {
        let mut pending = self.head_bytes();
        let file = match self.body {
            Body::Empty => None,
            Body::Bytes(bytes) => {
                pending.extend_from_slice(&bytes);
                None
            }
            Body::File(file) => Some(file),
        };

        Outgoing {
            status: self.status,
            pending,
            offset: 0,
            file,
            written: 0,
        }
    }

    /// Obtiene el código de estado de la respuesta
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Obtiene el valor de un header
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Obtiene los headers en orden de envío
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Obtiene el body
    pub fn body(&self) -> &Body {
        &self.body
    }
}

/// Response a mitad de envío sobre un socket no bloqueante
#[derive(Debug)]
pub struct Outgoing {
    status: StatusCode,

    /// Bytes listos para escribir; `offset` marca lo ya enviado
    pending: Vec<u8>,
    offset: usize,

    /// Resto del body, si es un archivo
    file: Option<File>,

    written: u64,
}

impl Outgoing {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Bytes enviados hasta ahora
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Escribe todo lo que `out` acepte sin bloquear
    ///
    /// Retorna `true` cuando ya no queda nada por enviar y `false` si `out`
    /// respondió `WouldBlock` antes de terminar.
    pub fn write_some<W: Write>(&mut self, out: &mut W) -> io::Result<bool> {
        loop {
            if self.offset == self.pending.len() && !self.refill()? {
                return Ok(true);
            }

            match out.write(&self.pending[self.offset..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.offset += n;
                    self.written += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Carga el siguiente bloque del archivo. `false` si no queda nada.
    fn refill(&mut self) -> io::Result<bool> {
        let Some(file) = self.file.as_mut() else {
            return Ok(false);
        };

        self.pending.resize(CHUNK_SIZE, 0);
        self.offset = 0;
        loop {
            match file.read(&mut self.pending) {
                Ok(0) => {
                    self.pending.clear();
                    self.file = None;
                    return Ok(false);
                }
                Ok(n) => {
                    self.pending.truncate(n);
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};

    fn render(response: Response) -> Vec<u8> {
        let mut out = Vec::new();
        assert!(response.into_outgoing().write_some(&mut out).unwrap());
        out
    }

    /// Writer que acepta `budget` bytes y después responde `WouldBlock`
    struct Throttled {
        out: Vec<u8>,
        budget: usize,
    }

    impl Write for Throttled {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.budget);
            self.out.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    // ==================== Errores fijos ====================

    #[test]
    fn test_400_exact_bytes() {
        let bytes = render(Response::error(StatusCode::BadRequest));
        assert_eq!(
            bytes,
            b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\nContent-Length: 11\r\n\r\nBad Request"
        );
    }

    #[test]
    fn test_404_exact_bytes() {
        let bytes = render(Response::error(StatusCode::NotFound));
        assert_eq!(
            bytes,
            b"HTTP/1.1 404 Not Found\r\nConnection: close\r\nContent-Length: 9\r\n\r\nNot Found"
        );
    }

    #[test]
    fn test_413_exact_bytes() {
        let bytes = render(Response::error(StatusCode::PayloadTooLarge));
        assert_eq!(
            bytes,
            b"HTTP/1.1 413 Request Entity Too Large\r\nConnection: close\r\nContent-Length: 31\r\n\r\nSorry, Request Entity Too Large".to_vec()
        );
    }

    #[test]
    fn test_500_exact_bytes() {
        let bytes = render(Response::error(StatusCode::ServerError));
        assert_eq!(
            bytes,
            b"HTTP/1.1 500 Server Error\r\nConnection: close\r\nContent-Length: 26\r\n\r\nSorry, File Name Collision".to_vec()
        );
    }

    // ==================== 200 ====================

    #[test]
    fn test_ok_header_order() {
        let response = Response::new(StatusCode::Ok)
            .with_header("Connection", "close")
            .with_body("Mon Jan  1 00:00:00 2024\n")
            .with_header("Content-Type", "text/html");

        let text = String::from_utf8(render(response)).unwrap();
        assert_eq!(
            text,
            "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 25\r\nContent-Type: text/html\r\n\r\nMon Jan  1 00:00:00 2024\n"
        );
    }

    #[test]
    fn test_with_header_overwrites_in_place() {
        let response = Response::new(StatusCode::Ok)
            .with_header("Connection", "keep-alive")
            .with_header("X-Other", "1")
            .with_header("connection", "close");

        assert_eq!(response.headers().len(), 2);
        assert_eq!(response.headers()[0].1, "close");
    }

    #[test]
    fn test_file_body_streams_all_chunks() {
        let mut file = tempfile::tempfile().unwrap();
        let content: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        file.write_all(&content).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let response = Response::new(StatusCode::Ok).with_file(file, content.len() as u64);
        assert_eq!(response.header("Content-Length"), Some(content.len().to_string().as_str()));

        let bytes = render(response);
        assert!(bytes.ends_with(&content));
    }

    #[test]
    fn test_write_some_counts_bytes() {
        let mut out = Vec::new();
        let mut outgoing = Response::error(StatusCode::NotFound).into_outgoing();
        assert!(outgoing.write_some(&mut out).unwrap());
        assert_eq!(outgoing.written(), out.len() as u64);
        assert_eq!(outgoing.status(), StatusCode::NotFound);
    }

    // ==================== Envío parcial ====================

    #[test]
    fn test_would_block_resumes_where_it_stopped() {
        let mut file = tempfile::tempfile().unwrap();
        let content: Vec<u8> = (0..(CHUNK_SIZE * 2 + 5)).map(|i| (i % 13) as u8).collect();
        file.write_all(&content).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let expected = render(
            Response::new(StatusCode::Ok).with_file(tempfile::tempfile().unwrap(), content.len() as u64),
        );
        let head_len = expected.len();

        let mut outgoing = Response::new(StatusCode::Ok)
            .with_file(file, content.len() as u64)
            .into_outgoing();
        let mut out = Throttled {
            out: Vec::new(),
            budget: 1000,
        };

        let mut rounds = 0;
        while !outgoing.write_some(&mut out).unwrap() {
            rounds += 1;
            out.budget = 1000;
        }

        assert!(rounds > 1);
        assert_eq!(outgoing.written(), out.out.len() as u64);
        assert_eq!(&out.out[..head_len], &expected[..]);
        assert_eq!(&out.out[head_len..], &content[..]);
    }

    #[test]
    fn test_write_zero_is_error() {
        let mut out = Throttled {
            out: Vec::new(),
            budget: 0,
        };
        let mut outgoing = Response::error(StatusCode::BadRequest).into_outgoing();

        // WouldBlock sin avanzar no es error
        assert!(!outgoing.write_some(&mut out).unwrap());
        assert_eq!(outgoing.written(), 0);

        let mut closed: &mut [u8] = &mut [];
        let err = outgoing.write_some(&mut closed).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_empty_body_response() {
        let text = String::from_utf8(render(Response::new(StatusCode::Ok))).unwrap();
        assert_eq!(text, "HTTP/1.1 200 OK\r\n\r\n");
    }
}
