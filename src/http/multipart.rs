//! # Extracción de Archivos Multipart
//! src/http/multipart.rs
//!
//! No es un parser multipart completo: busca el primer `filename`, toma su
//! valor entre comillas, y copia el contenido del part hasta encontrar el
//! delimitador final `--boundary--`. Está aislado detrás de
//! [`extract_and_store`] para poder reemplazarlo sin tocar el resto.
//!
//! ## Resultados posibles
//!
//! | Outcome          | Response |
//! |------------------|----------|
//! | `NoFile`         | la del GET equivalente |
//! | `Stored(path)`   | la del GET equivalente |
//! | `TooLarge`       | 413 |
//! | `NameCollision`  | 500 |
//! | `Rejected(_)`    | 400 |
//!
//! El nombre de archivo lo controla el cliente: se rechaza cualquier nombre
//! con separadores de path, `..`, bytes de control, o más de 255 bytes.
//!
//! El archivo se escribe primero en un temporal dentro del directorio de
//! uploads y luego se publica con semántica "crear si no existe" atómica;
//! el nombre final nunca aparece con contenido parcial.

use super::{find_subsequence, StatusCode};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Máximo de bytes de contenido que se aceptan en un upload
pub const MAX_UPLOAD_SIZE: usize = 500_000;

/// Largo máximo de un nombre de archivo (NAME_MAX en Linux)
pub const MAX_FILENAME_LEN: usize = 255;

const FILENAME_TOKEN: &[u8] = b"filename";
const CONTENT_TYPE_TOKEN: &[u8] = b"Content-Type";
const PART_HEADERS_END: &[u8] = b"\r\n\r\n";
const CRLF: &[u8] = b"\r\n";

/// Motivo por el que se rechaza un upload con 400
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// `filename` sin valor entre comillas, o sin comilla de cierre
    MalformedFilename,

    /// Nombre con `/`, `\`, `..`, bytes de control o demasiado largo
    UnsafeFilename(String),

    /// El part no tiene la línea vacía que cierra sus headers
    MissingPartHeaders,
}

/// Resultado de procesar el body de un POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// No había archivo que guardar (sin `filename`, nombre vacío o sin extensión)
    NoFile,

    /// Archivo guardado en el path indicado
    Stored(PathBuf),

    /// No se encontró el delimitador final dentro del límite
    TooLarge,

    /// Ya existe un archivo con ese nombre
    NameCollision,

    /// Upload rechazado por el nombre o por formato
    Rejected(RejectReason),
}

impl UploadOutcome {
    /// Código con el que este resultado corta la respuesta, si corresponde.
    ///
    /// `NoFile` y `Stored` no cortan nada: el request sigue y se resuelve
    /// su path como en un GET.
    pub fn status_override(&self) -> Option<StatusCode> {
        match self {
            UploadOutcome::NoFile | UploadOutcome::Stored(_) => None,
            UploadOutcome::TooLarge => Some(StatusCode::PayloadTooLarge),
            UploadOutcome::NameCollision => Some(StatusCode::ServerError),
            UploadOutcome::Rejected(_) => Some(StatusCode::BadRequest),
        }
    }
}

/// Errores de escritura en disco después de validar el upload
#[derive(Debug, Error)]
pub enum UploadError {
    /// No se pudo crear, escribir o publicar el archivo
    #[error("no se pudo guardar el archivo subido: {0}")]
    Io(#[from] io::Error),
}

/// Resultado del escaneo del body, antes de tocar el disco
#[derive(Debug, PartialEq, Eq)]
pub enum Scan<'a> {
    /// Nada que guardar
    NoFile,

    /// Archivo encontrado con su contenido
    File { name: &'a str, content: &'a [u8] },

    /// Delimitador no encontrado dentro del límite
    TooLarge,

    /// Upload inválido
    Rejected(RejectReason),
}

/// Escanea el body buscando el archivo subido
///
/// `body` empieza en el separador de headers del request; `delimiter` es el
/// delimitador final (`--boundary--`).
///
/// # Ejemplo
/// ```
/// use http_upload_server::http::multipart::{scan, Scan};
///
/// let body = b"\r\n\r\n--X\r\n\
///     Content-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\
///     Content-Type: text/plain\r\n\r\nhola\r\n--X--\r\n";
///
/// assert_eq!(scan(body, b"--X--", 1000), Scan::File { name: "a.txt", content: b"hola" });
/// ```
pub fn scan<'a>(body: &'a [u8], delimiter: &[u8], max_content: usize) -> Scan<'a> {
    let token = match find_subsequence(body, FILENAME_TOKEN) {
        Some(offset) => offset,
        None => return Scan::NoFile,
    };
    let after_token = token + FILENAME_TOKEN.len();

    let name = match quoted_value(&body[after_token..]) {
        Some(name) => name,
        None => return Scan::Rejected(RejectReason::MalformedFilename),
    };

    if name.is_empty() {
        return Scan::NoFile;
    }

    let name = match sanitize_filename(name) {
        Ok(name) => name,
        Err(reason) => return Scan::Rejected(reason),
    };

    // Sin extensión no se guarda nada
    if !name.contains('.') {
        return Scan::NoFile;
    }

    let content_start = match part_content_start(body, after_token) {
        Some(start) => start,
        None => return Scan::Rejected(RejectReason::MissingPartHeaders),
    };

    // Contenido máximo + el \r\n que precede al delimitador + el delimitador
    let window_end = body.len().min(
        content_start
            .saturating_add(max_content)
            .saturating_add(CRLF.len())
            .saturating_add(delimiter.len()),
    );
    let window = &body[content_start..window_end];

    let Some(end) = find_subsequence(window, delimiter) else {
        return Scan::TooLarge;
    };

    // El \r\n previo al delimitador pertenece al delimitador
    let content = &window[..end];
    let content = content.strip_suffix(CRLF).unwrap_or(content);
    if content.len() > max_content {
        return Scan::TooLarge;
    }

    Scan::File { name, content }
}

/// Valor entre comillas que sigue al token `filename`
fn quoted_value(rest: &[u8]) -> Option<&[u8]> {
    let open = find_subsequence(rest, b"\"")? + 1;
    let close = find_subsequence(&rest[open..], b"\"")?;
    Some(&rest[open..open + close])
}

/// Offset donde empieza el contenido: después de la línea vacía que cierra
/// los headers del part, buscada desde el header `Content-Type` si existe.
fn part_content_start(body: &[u8], after_token: usize) -> Option<usize> {
    let headers_from = find_subsequence(&body[after_token..], CONTENT_TYPE_TOKEN)
        .map(|offset| after_token + offset)
        .unwrap_or(after_token);

    find_subsequence(&body[headers_from..], PART_HEADERS_END)
        .map(|offset| headers_from + offset + PART_HEADERS_END.len())
}

/// Valida un nombre de archivo enviado por el cliente
///
/// No se limpia el nombre: si es peligroso se rechaza completo.
pub fn sanitize_filename(raw: &[u8]) -> Result<&str, RejectReason> {
    let lossy = || String::from_utf8_lossy(raw).into_owned();

    let name = std::str::from_utf8(raw).map_err(|_| RejectReason::UnsafeFilename(lossy()))?;

    let unsafe_name = name.len() > MAX_FILENAME_LEN
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.chars().any(char::is_control)
        || name == ".";

    if unsafe_name {
        return Err(RejectReason::UnsafeFilename(lossy()));
    }

    Ok(name)
}

/// Guarda `content` como `upload_dir/name` sólo si ese nombre no existe
pub fn store(upload_dir: &Path, name: &str, content: &[u8]) -> Result<UploadOutcome, UploadError> {
    let target = upload_dir.join(name);

    let mut staged = tempfile::Builder::new()
        .prefix(".upload-")
        .tempfile_in(upload_dir)?;
    staged.write_all(content)?;
    staged.flush()?;

    match staged.persist_noclobber(&target) {
        Ok(_) => Ok(UploadOutcome::Stored(target)),
        // El temporal se borra al soltar el error
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(UploadOutcome::NameCollision),
        Err(e) => Err(UploadError::Io(e.error)),
    }
}

/// Escanea el body y, si hay un archivo válido, lo guarda
pub fn extract_and_store(
    body: &[u8],
    delimiter: &[u8],
    upload_dir: &Path,
    max_content: usize,
) -> Result<UploadOutcome, UploadError> {
    match scan(body, delimiter, max_content) {
        Scan::NoFile => Ok(UploadOutcome::NoFile),
        Scan::TooLarge => Ok(UploadOutcome::TooLarge),
        Scan::Rejected(reason) => Ok(UploadOutcome::Rejected(reason)),
        Scan::File { name, content } => store(upload_dir, name, content),
    }
}
