//! Transport-decoded request parameters and file uploads.

use crate::error::GqlError;
use crate::time::TraceTiming;
use bytes::Bytes;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::io::{self, Read};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Prefix of the marker value written into a variable slot when an upload
/// is bound to it. The remainder of the string is the dotted variable path.
const UPLOAD_MARKER: &str = "__oxgql_upload:";

/// Wire-decoded request input, before parsing or validation.
///
/// Immutable once constructed except for upload substitution, which replaces
/// null placeholders inside `variables` with bound upload handles.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RawParams {
    #[serde(default)]
    pub query: String,
    #[serde(default, rename = "operationName")]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub extensions: Map<String, Value>,
    /// Upload handles keyed by dotted variable path.
    #[serde(skip)]
    pub uploads: FxHashMap<String, Upload>,
    /// Span covering the wire read, on the executor clock.
    #[serde(skip)]
    pub read_time: TraceTiming,
}

impl RawParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Binds an upload to the variable slot at `path`.
    ///
    /// The path is dotted and rooted at `variables`
    /// (e.g. `variables.input.file` or `variables.files.0`). The slot must
    /// already exist in the decoded variables and hold JSON null.
    pub fn add_upload(&mut self, upload: Upload, key: &str, path: &str) -> Result<(), GqlError> {
        let mut segments = path.split('.');
        if segments.next() != Some("variables") {
            return Err(GqlError::protocol(format!(
                "invalid operations path {path} for key {key}: must start with variables"
            )));
        }
        let not_found = || {
            GqlError::protocol(format!(
                "upload path {path} for key {key} does not exist in variables"
            ))
        };

        let first = segments.next().ok_or_else(not_found)?;
        let mut slot = self.variables.get_mut(first).ok_or_else(not_found)?;
        for segment in segments {
            slot = match slot {
                Value::Object(map) => map.get_mut(segment).ok_or_else(not_found)?,
                Value::Array(items) => {
                    let index: usize = segment.parse().map_err(|_| not_found())?;
                    items.get_mut(index).ok_or_else(not_found)?
                }
                _ => return Err(not_found()),
            };
        }
        if !slot.is_null() {
            return Err(GqlError::protocol(format!(
                "upload path {path} for key {key} must point at a null placeholder"
            )));
        }
        *slot = Value::String(format!("{UPLOAD_MARKER}{path}"));
        self.uploads.insert(path.to_string(), upload);
        Ok(())
    }

    /// Resolves a bound upload from a substituted variable value.
    pub fn upload_for(&self, value: &Value) -> Option<&Upload> {
        let path = value.as_str()?.strip_prefix(UPLOAD_MARKER)?;
        self.uploads.get(path)
    }

    /// Resolves a bound upload by dotted variable path.
    pub fn upload_at(&self, path: &str) -> Option<&Upload> {
        self.uploads.get(path)
    }
}

/// An uploaded file bound into the request variables.
///
/// A single wire part may back several variable paths; each `reader()` call
/// yields a fresh independent reader over the same bytes regardless of the
/// buffering strategy.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub size: u64,
    pub content_type: Option<String>,
    content: UploadContent,
}

#[derive(Debug, Clone)]
enum UploadContent {
    /// Fully buffered in memory.
    Memory(Bytes),
    /// Spooled to a temporary file shared by all paths of the same part.
    /// The file is removed once the last handle drops.
    Spooled(Arc<NamedTempFile>),
}

impl Upload {
    pub fn from_bytes(
        filename: impl Into<String>,
        content_type: Option<String>,
        bytes: Bytes,
    ) -> Self {
        Self {
            filename: filename.into(),
            size: bytes.len() as u64,
            content_type,
            content: UploadContent::Memory(bytes),
        }
    }

    pub fn from_temp_file(
        filename: impl Into<String>,
        content_type: Option<String>,
        size: u64,
        file: Arc<NamedTempFile>,
    ) -> Self {
        Self {
            filename: filename.into(),
            size,
            content_type,
            content: UploadContent::Spooled(file),
        }
    }

    /// Opens a fresh independent reader over the full contents.
    pub fn reader(&self) -> io::Result<Box<dyn Read + Send>> {
        match &self.content {
            UploadContent::Memory(bytes) => Ok(Box::new(io::Cursor::new(bytes.clone()))),
            UploadContent::Spooled(file) => Ok(Box::new(file.reopen()?)),
        }
    }

    /// Reads the whole contents through a fresh reader.
    pub fn bytes(&self) -> io::Result<Bytes> {
        let mut reader = self.reader()?;
        let mut buf = Vec::with_capacity(self.size as usize);
        reader.read_to_end(&mut buf)?;
        Ok(buf.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn upload(content: &str) -> Upload {
        Upload::from_bytes("a.txt", Some("text/plain".to_string()), Bytes::from(content.to_string()))
    }

    fn params_with(variables: Value) -> RawParams {
        let mut params = RawParams::new("mutation($file: Upload!) { upload(file: $file) }");
        params.variables = variables.as_object().cloned().unwrap_or_default();
        params
    }

    #[test]
    fn binds_upload_at_nested_path() {
        let mut params = params_with(json!({"input": {"file": null}}));
        params
            .add_upload(upload("hi"), "0", "variables.input.file")
            .unwrap();

        let bound = params.upload_at("variables.input.file").unwrap();
        assert_eq!(bound.bytes().unwrap(), Bytes::from_static(b"hi"));

        let marker = &params.variables["input"]["file"];
        assert!(params.upload_for(marker).is_some());
    }

    #[test]
    fn binds_upload_at_array_index() {
        let mut params = params_with(json!({"files": [null, null]}));
        params
            .add_upload(upload("x"), "0", "variables.files.1")
            .unwrap();
        assert!(params.upload_at("variables.files.1").is_some());
        assert!(params.variables["files"][0].is_null());
    }

    #[test]
    fn rejects_missing_path() {
        let mut params = params_with(json!({"input": {}}));
        let err = params
            .add_upload(upload("x"), "file0", "variables.input.file")
            .unwrap_err();
        assert!(err.message.contains("file0"), "{}", err.message);
        assert!(err.message.contains("does not exist"));
    }

    #[test]
    fn rejects_non_null_placeholder() {
        let mut params = params_with(json!({"file": "occupied"}));
        let err = params
            .add_upload(upload("x"), "0", "variables.file")
            .unwrap_err();
        assert!(err.message.contains("null placeholder"));
    }

    #[test]
    fn rejects_path_outside_variables() {
        let mut params = params_with(json!({"file": null}));
        assert!(params.add_upload(upload("x"), "0", "query.file").is_err());
    }

    #[test]
    fn memory_and_spooled_readers_yield_identical_bytes() {
        let body = b"upload body bytes";
        let memory = Upload::from_bytes("f", None, Bytes::from_static(body));

        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(body).unwrap();
        tmp.flush().unwrap();
        let spooled = Upload::from_temp_file("f", None, body.len() as u64, Arc::new(tmp));

        assert_eq!(memory.bytes().unwrap(), spooled.bytes().unwrap());
        // a second reader starts from the beginning again
        assert_eq!(spooled.bytes().unwrap(), Bytes::from_static(body));
    }
}
