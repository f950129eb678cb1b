//! Multipart form transport implementing the multipart request convention
//! for file uploads: an `operations` part, a `map` part binding form keys
//! to variable paths, then one part per file key.

use crate::request::{WireRequest, WireResponse};
use crate::transport::{dispatch_single, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use indexmap::IndexMap;
use multer::Multipart;
use oxgql_core::{Executor, GqlError, RawParams, Upload};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;

const DEFAULT_MAX_UPLOAD_SIZE: u64 = 32 << 20;
const DEFAULT_MAX_MEMORY: u64 = 32 << 20;

pub struct MultipartForm {
    /// Declared content-length ceiling; larger requests are refused before
    /// the body is parsed.
    pub max_upload_size: u64,
    /// Per-file threshold above which multi-path uploads spool to disk.
    pub max_memory: u64,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self {
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            max_memory: DEFAULT_MAX_MEMORY,
        }
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_upload_size(mut self, bytes: u64) -> Self {
        self.max_upload_size = bytes;
        self
    }

    pub fn max_memory(mut self, bytes: u64) -> Self {
        self.max_memory = bytes;
        self
    }
}

fn unprocessable(message: impl Into<String>) -> WireResponse {
    WireResponse::error(
        StatusCode::UNPROCESSABLE_ENTITY,
        GqlError::protocol(message),
    )
}

#[async_trait]
impl Transport for MultipartForm {
    fn supports(&self, request: &WireRequest) -> bool {
        request.method == Method::POST
            && request
                .content_type()
                .map(|mime| mime.essence_str() == mime::MULTIPART_FORM_DATA.essence_str())
                .unwrap_or(false)
    }

    async fn handle(&self, exec: &Executor, request: WireRequest) -> WireResponse {
        let started = exec.clock().now();
        if let Some(length) = request.content_length() {
            if length > self.max_upload_size {
                // matches the historical wire behavior: body refused, but
                // the status line stays 200
                return WireResponse::error(
                    StatusCode::OK,
                    GqlError::protocol("failed to parse multipart form, request body too large"),
                );
            }
        }

        let boundary = match request
            .header(http::header::CONTENT_TYPE)
            .ok_or(multer::Error::NoBoundary)
            .and_then(multer::parse_boundary)
        {
            Ok(boundary) => boundary,
            Err(_) => return unprocessable("failed to parse multipart form"),
        };

        let body = request.body.clone();
        let mut multipart = Multipart::new(
            futures::stream::once(async move { Ok::<Bytes, std::io::Error>(body) }),
            boundary,
        );

        let mut params: Option<RawParams> = None;
        let mut map: Option<IndexMap<String, Vec<String>>> = None;

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(_) => return unprocessable("failed to parse multipart form"),
            };
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "operations" => {
                    let text = match field.text().await {
                        Ok(text) => text,
                        Err(_) => return unprocessable("failed to parse multipart form"),
                    };
                    match serde_json::from_str(&text) {
                        Ok(decoded) => params = Some(decoded),
                        Err(_) => {
                            return unprocessable("operations form field could not be decoded")
                        }
                    }
                }
                "map" => {
                    let text = match field.text().await {
                        Ok(text) => text,
                        Err(_) => return unprocessable("failed to parse multipart form"),
                    };
                    match serde_json::from_str(&text) {
                        Ok(decoded) => map = Some(decoded),
                        Err(_) => return unprocessable("map form field could not be decoded"),
                    }
                }
                key => {
                    let Some(params) = params.as_mut() else {
                        return unprocessable("operations form field must precede file parts");
                    };
                    let Some(map) = map.as_mut() else {
                        return unprocessable("map form field must precede file parts");
                    };
                    let Some(paths) = map.shift_remove(key) else {
                        debug!(key, "ignoring form part absent from upload map");
                        continue;
                    };
                    if paths.is_empty() {
                        return unprocessable(format!(
                            "invalid empty operations paths list for key {key}"
                        ));
                    }
                    let key = key.to_string();
                    let filename = field.file_name().unwrap_or(&key).to_string();
                    let content_type = field.content_type().map(|m| m.to_string());

                    if paths.len() == 1 {
                        let bytes = match field.bytes().await {
                            Ok(bytes) => bytes,
                            Err(_) => return unprocessable("failed to parse multipart form"),
                        };
                        let upload = Upload::from_bytes(filename, content_type, bytes);
                        if let Err(err) = params.add_upload(upload, &key, &paths[0]) {
                            return unprocessable(err.message);
                        }
                        continue;
                    }

                    // one wire part, many variable slots: buffer small files,
                    // spool large ones to a shared temp file
                    match self.buffer_field(field).await {
                        Ok(FieldBody::Memory(bytes)) => {
                            for path in &paths {
                                let upload = Upload::from_bytes(
                                    filename.clone(),
                                    content_type.clone(),
                                    bytes.clone(),
                                );
                                if let Err(err) = params.add_upload(upload, &key, path) {
                                    return unprocessable(err.message);
                                }
                            }
                        }
                        Ok(FieldBody::Spooled(file, size)) => {
                            for path in &paths {
                                let upload = Upload::from_temp_file(
                                    filename.clone(),
                                    content_type.clone(),
                                    size,
                                    file.clone(),
                                );
                                if let Err(err) = params.add_upload(upload, &key, path) {
                                    return unprocessable(err.message);
                                }
                            }
                        }
                        Err(response) => return response,
                    }
                }
            }
        }

        let Some(mut params) = params else {
            return unprocessable("operations form field is required");
        };
        if let Some(missing) = map.and_then(|m| m.into_iter().next()) {
            return unprocessable(format!("failed to get key {} from form", missing.0));
        }
        params.read_time.start = started;
        params.read_time.end = exec.clock().now();
        dispatch_single(exec, params).await
    }
}

enum FieldBody {
    Memory(Bytes),
    Spooled(Arc<NamedTempFile>, u64),
}

impl MultipartForm {
    async fn buffer_field(&self, mut field: multer::Field<'_>) -> Result<FieldBody, WireResponse> {
        let mut buffered: Vec<u8> = Vec::new();
        let mut spool: Option<NamedTempFile> = None;
        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(_) => return Err(unprocessable("failed to parse multipart form")),
            };
            match spool.as_mut() {
                Some(file) => {
                    if file.write_all(&chunk).is_err() {
                        return Err(unprocessable("failed to buffer upload"));
                    }
                }
                None => {
                    buffered.extend_from_slice(&chunk);
                    if buffered.len() as u64 > self.max_memory {
                        let mut file = match NamedTempFile::new() {
                            Ok(file) => file,
                            Err(_) => return Err(unprocessable("failed to buffer upload")),
                        };
                        if file.write_all(&buffered).is_err() {
                            return Err(unprocessable("failed to buffer upload"));
                        }
                        buffered.clear();
                        spool = Some(file);
                    }
                }
            }
        }
        match spool {
            Some(mut file) => {
                if file.flush().is_err() {
                    return Err(unprocessable("failed to buffer upload"));
                }
                let size = file
                    .as_file()
                    .metadata()
                    .map(|m| m.len())
                    .unwrap_or_default();
                Ok(FieldBody::Spooled(Arc::new(file), size))
            }
            None => Ok(FieldBody::Memory(buffered.into())),
        }
    }
}
