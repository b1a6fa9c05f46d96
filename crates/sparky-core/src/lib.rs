//! Core types for the sparky API client.
//!
//! This crate holds everything that does not touch the network:
//!
//! - [`RequestSpec`] / [`RawRequest`] - what a logical API call asks for
//! - [`Outcome`] / [`ContentFile`] - what a logical API call resolves to
//! - [`ValidationError`] - rejections raised before any I/O
//! - [`webhook`] - HMAC-SHA1 verification of inbound webhook callbacks
//! - [`tracing`] - optional subscriber setup for hosts

pub mod error;
pub mod outcome;
pub mod request;
pub mod tracing;
pub mod webhook;

pub use error::{ValidationError, ValidationResult};
pub use outcome::{ContentFile, Outcome, Record, disposition_filename};
pub use request::{Attachment, Method, Payload, RawRequest, RequestSpec, Resource};
pub use self::tracing::{LogConfig, LogFormat, LoggingError, init_logging};
pub use webhook::{AuthError, SIGNATURE_HEADER, SignedBody};
