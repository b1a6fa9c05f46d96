//! Results of a logical request.

use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A single record as returned by the API.
pub type Record = Value;

/// The terminal result of a successful logical request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The server confirmed the call without returning data (204).
    Empty,
    /// A single record.
    Object(Record),
    /// The merged items of every page that was fetched.
    List(Vec<Record>),
    /// A downloaded file from a binary endpoint.
    File(ContentFile),
}

impl Outcome {
    /// Returns true for [`Outcome::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Converts into a list of records.
    ///
    /// A single object becomes a one-element list and an empty success an
    /// empty list. Files yield `None`.
    pub fn into_list(self) -> Option<Vec<Record>> {
        match self {
            Self::Empty => Some(Vec::new()),
            Self::Object(record) => Some(vec![record]),
            Self::List(records) => Some(records),
            Self::File(_) => None,
        }
    }

    /// Returns the single record, if this is one.
    pub fn into_object(self) -> Option<Record> {
        match self {
            Self::Object(record) => Some(record),
            _ => None,
        }
    }

    /// Returns the downloaded file, if this is one.
    pub fn into_file(self) -> Option<ContentFile> {
        match self {
            Self::File(file) => Some(file),
            _ => None,
        }
    }

    /// Deserializes the outcome into a typed value.
    ///
    /// Objects deserialize as `T`, lists as a JSON array and empty successes
    /// as `null`.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        let value = match self {
            Self::Empty => Value::Null,
            Self::Object(record) => record,
            Self::List(records) => Value::Array(records),
            Self::File(file) => Value::String(file.base64()),
        };
        serde_json::from_value(value)
    }
}

/// Matches the quoted file name inside a content-disposition header.
static DISPOSITION_FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(.*)""#).expect("valid regex"));

/// Extracts the quoted file name from a content-disposition header value.
///
/// `attachment; filename="report.pdf"` yields `report.pdf`. Returns `None`
/// when no quoted segment exists or it is empty.
pub fn disposition_filename(header: &str) -> Option<String> {
    DISPOSITION_FILENAME
        .captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| !name.is_empty())
}

/// A file downloaded from the contents endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentFile {
    /// Content id the file was fetched with.
    pub id: String,
    /// File name from the content-disposition header.
    pub name: String,
    /// Extension taken from the file name.
    pub ext: String,
    /// Value of the content-type header.
    pub content_type: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl ContentFile {
    /// Builds a file from response headers and body.
    ///
    /// Returns `None` if the disposition header carries no file name.
    pub fn from_headers(
        id: impl Into<String>,
        content_disposition: &str,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Option<Self> {
        let name = disposition_filename(content_disposition)?;
        let ext = name.rsplit('.').next().unwrap_or_default().to_string();
        Some(Self {
            id: id.into(),
            name,
            ext,
            content_type: content_type.unwrap_or("application/octet-stream").to_string(),
            bytes,
        })
    }

    /// Returns the contents encoded as standard base64.
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

impl std::fmt::Debug for ContentFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentFile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}
