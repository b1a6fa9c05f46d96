//! Logical request descriptions.
//!
//! A [`RequestSpec`] names *what* to call: a [`Method`], a [`Resource`], an
//! optional record id, key/value payload and an optional cap on the number of
//! list items returned. It says nothing about URLs, headers or throttling;
//! the engine derives those when the request is submitted.
//!
//! Callers holding untyped input (for example a method and resource read from
//! a script) can go through [`RawRequest`], which validates the strings
//! against the closed method and resource sets.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::{ValidationError, ValidationResult};

/// Key/value data sent with a request.
///
/// Used as query parameters for GET and DELETE and as the body for POST, PUT
/// and FORM.
pub type Payload = Map<String, Value>;

/// The request method of a logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read a record or a collection.
    Get,
    /// Create a record from a JSON body.
    Post,
    /// Replace a record from a JSON body.
    Put,
    /// Remove a record.
    Delete,
    /// POST with a multipart body, used when a file accompanies the data.
    Form,
}

impl Method {
    /// Returns the lowercase name used by the API client surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Delete => "delete",
            Self::Form => "form",
        }
    }

    /// Returns the HTTP verb that goes on the wire.
    ///
    /// FORM is sent as POST.
    pub fn http_verb(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post | Self::Form => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Returns true if the payload travels in the query string.
    pub fn uses_query(&self) -> bool {
        matches!(self, Self::Get | Self::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.http_verb())
    }
}

impl FromStr for Method {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            "put" => Ok(Self::Put),
            "delete" => Ok(Self::Delete),
            "form" => Ok(Self::Form),
            _ => Err(ValidationError::UnknownMethod(s.to_string())),
        }
    }
}

/// An API endpoint collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Contents,
    Events,
    Licenses,
    Memberships,
    Messages,
    Organizations,
    People,
    Roles,
    Rooms,
    TeamMemberships,
    Teams,
    Webhooks,
}

impl Resource {
    /// All known resources.
    pub const ALL: [Resource; 12] = [
        Self::Contents,
        Self::Events,
        Self::Licenses,
        Self::Memberships,
        Self::Messages,
        Self::Organizations,
        Self::People,
        Self::Roles,
        Self::Rooms,
        Self::TeamMemberships,
        Self::Teams,
        Self::Webhooks,
    ];

    /// Returns the path of this resource relative to the API root.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Contents => "contents",
            Self::Events => "events",
            Self::Licenses => "licenses",
            Self::Memberships => "memberships",
            Self::Messages => "messages",
            Self::Organizations => "organizations",
            Self::People => "people",
            Self::Roles => "roles",
            Self::Rooms => "rooms",
            Self::TeamMemberships => "team/memberships",
            Self::Teams => "teams",
            Self::Webhooks => "webhooks",
        }
    }

    /// Returns true if responses are file downloads rather than JSON.
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Contents)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Resource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        if lower == "team-memberships" {
            return Ok(Self::TeamMemberships);
        }
        Self::ALL
            .into_iter()
            .find(|r| r.path() == lower)
            .ok_or_else(|| ValidationError::UnknownResource(s.to_string()))
    }
}

/// A file sent as part of a FORM request.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Multipart field name.
    pub field: String,
    /// File name reported to the server.
    pub file_name: String,
    /// MIME type of the contents.
    pub content_type: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment sent under the `files` field.
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            field: "files".to_string(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Builder: set the multipart field name.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// An immutable description of one logical API call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    method: Method,
    resource: Resource,
    id: Option<String>,
    payload: Payload,
    max_results: Option<usize>,
    attachment: Option<Attachment>,
}

impl RequestSpec {
    /// Creates a request with no id, empty payload and no result cap.
    pub fn new(method: Method, resource: Resource) -> Self {
        Self {
            method,
            resource,
            id: None,
            payload: Payload::new(),
            max_results: None,
            attachment: None,
        }
    }

    /// Shorthand for a GET spec.
    pub fn get(resource: Resource) -> Self {
        Self::new(Method::Get, resource)
    }

    /// Builder: set the record id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder: replace the payload.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Builder: add one payload entry.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Builder: cap the number of list items returned.
    ///
    /// Zero means no cap.
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = (max > 0).then_some(max);
        self
    }

    /// Builder: attach a file (FORM requests only).
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns the list cap, `None` when unbounded.
    pub fn max_results(&self) -> Option<usize> {
        self.max_results
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Checks the fields that the type system cannot.
    pub fn validate(&self) -> ValidationResult<()> {
        if let Some(id) = &self.id {
            if id.is_empty() {
                return Err(ValidationError::EmptyId);
            }
            if id.contains('/') || id.contains('?') || id.contains('#') {
                return Err(ValidationError::InvalidId(id.clone()));
            }
        }
        if self.attachment.is_some() && self.method != Method::Form {
            return Err(ValidationError::AttachmentRequiresForm);
        }
        if self.resource.is_binary() && self.method != Method::Get {
            return Err(ValidationError::BinaryResourceMethod {
                resource: self.resource.to_string(),
                method: self.method.to_string(),
            });
        }
        Ok(())
    }
}

/// A request expressed with untyped method and resource names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRequest {
    /// Method name, matched case-insensitively.
    pub method: String,
    /// Resource name, matched case-insensitively.
    pub resource: String,
    /// Optional record id.
    pub id: Option<String>,
    /// Query or body data.
    pub payload: Payload,
    /// List cap, zero for none.
    pub max_results: usize,
}

impl RawRequest {
    /// Creates a raw request for the given method and resource names.
    pub fn new(method: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            resource: resource.into(),
            ..Default::default()
        }
    }

    /// Builder: set the record id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder: replace the payload.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Builder: cap the number of list items returned.
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }
}

impl TryFrom<RawRequest> for RequestSpec {
    type Error = ValidationError;

    fn try_from(raw: RawRequest) -> Result<Self, Self::Error> {
        let method: Method = raw.method.parse()?;
        let resource: Resource = raw.resource.parse()?;

        let mut spec = RequestSpec::new(method, resource)
            .with_payload(raw.payload)
            .with_max_results(raw.max_results);
        if let Some(id) = raw.id {
            spec = spec.with_id(id);
        }
        spec.validate()?;
        Ok(spec)
    }
}
