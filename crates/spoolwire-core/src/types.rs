// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types: the IPP attribute model and decoded job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tags (RFC 8010 §3.5)
// ---------------------------------------------------------------------------

/// Delimiter tag partitioning attributes into logical groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupTag {
    /// Separator between two consecutive groups that carry the same tag.
    Zero,
    Operation,
    Job,
    End,
    Printer,
    Unsupported,
    Other(u8),
}

impl GroupTag {
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            0x00 => Self::Zero,
            0x01 => Self::Operation,
            0x02 => Self::Job,
            0x03 => Self::End,
            0x04 => Self::Printer,
            0x05 => Self::Unsupported,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Zero => 0x00,
            Self::Operation => 0x01,
            Self::Job => 0x02,
            Self::End => 0x03,
            Self::Printer => 0x04,
            Self::Unsupported => 0x05,
            Self::Other(tag) => tag,
        }
    }
}

/// Type code of a single attribute's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTag {
    /// 4 bytes, signed big-endian.
    Integer,
    /// 1 byte: 0x00 = false, 0x01 = true.
    Boolean,
    /// Same wire encoding as integer.
    Enum,
    /// textWithoutLanguage (UTF-8).
    Text,
    /// nameWithoutLanguage (UTF-8).
    Name,
    Keyword,
    Uri,
    Charset,
    NaturalLanguage,
    MimeMediaType,
    Other(u8),
}

impl ValueTag {
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            0x21 => Self::Integer,
            0x22 => Self::Boolean,
            0x23 => Self::Enum,
            0x41 => Self::Text,
            0x42 => Self::Name,
            0x44 => Self::Keyword,
            0x45 => Self::Uri,
            0x47 => Self::Charset,
            0x48 => Self::NaturalLanguage,
            0x49 => Self::MimeMediaType,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Integer => 0x21,
            Self::Boolean => 0x22,
            Self::Enum => 0x23,
            Self::Text => 0x41,
            Self::Name => 0x42,
            Self::Keyword => 0x44,
            Self::Uri => 0x45,
            Self::Charset => 0x47,
            Self::NaturalLanguage => 0x48,
            Self::MimeMediaType => 0x49,
            Self::Other(tag) => tag,
        }
    }

    /// Whether values with this tag are carried as UTF-8 / US-ASCII strings.
    pub fn is_string(self) -> bool {
        matches!(
            self,
            Self::Text
                | Self::Name
                | Self::Keyword
                | Self::Uri
                | Self::Charset
                | Self::NaturalLanguage
                | Self::MimeMediaType
        )
    }
}

// ---------------------------------------------------------------------------
// Attributes and messages
// ---------------------------------------------------------------------------

/// One value of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// integer and enum values.
    Integer(i32),
    Boolean(bool),
    /// Every string-family tag.
    String(String),
    /// Anything this crate does not interpret.
    Raw(Vec<u8>),
}

impl AttrValue {
    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }
}

/// A named, typed attribute with one or more ordered values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Empty only for separators.
    pub name: String,
    pub group_tag: GroupTag,
    pub value_tag: ValueTag,
    pub values: Vec<AttrValue>,
}

impl Attribute {
    /// A group separator (group tag zero, no name, no values).
    pub fn separator() -> Self {
        Self {
            name: String::new(),
            group_tag: GroupTag::Zero,
            value_tag: ValueTag::Other(0x00),
            values: Vec::new(),
        }
    }

    pub fn is_separator(&self) -> bool {
        self.group_tag == GroupTag::Zero
    }

    /// The first value, if any.
    pub fn first(&self) -> Option<&AttrValue> {
        self.values.first()
    }
}

/// An IPP request or response: a header plus an ordered attribute sequence.
///
/// `code` is the operation id in a request and the status code in a response.
/// Attributes stay in wire order; two consecutive groups with the same tag are
/// split by a [`Attribute::separator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMessage {
    pub version: (u8, u8),
    pub code: u16,
    pub request_id: u32,
    pub attributes: Vec<Attribute>,
}

impl AttributeMessage {
    /// IPP/1.1, the version this crate speaks.
    pub const VERSION: (u8, u8) = (1, 1);

    /// Start an empty request for `operation`.
    pub fn request(operation: Operation, request_id: u32) -> Self {
        Self {
            version: Self::VERSION,
            code: operation.id(),
            request_id,
            attributes: Vec::new(),
        }
    }

    /// Start an empty response with `status`.
    pub fn response(status: StatusCode, request_id: u32) -> Self {
        Self {
            version: Self::VERSION,
            code: status.0,
            request_id,
            attributes: Vec::new(),
        }
    }

    /// The status code, interpreting this message as a response.
    pub fn status(&self) -> StatusCode {
        StatusCode(self.code)
    }

    pub fn add(
        &mut self,
        group_tag: GroupTag,
        value_tag: ValueTag,
        name: &str,
        values: Vec<AttrValue>,
    ) -> &mut Self {
        self.attributes.push(Attribute {
            name: name.to_owned(),
            group_tag,
            value_tag,
            values,
        });
        self
    }

    pub fn add_string(
        &mut self,
        group_tag: GroupTag,
        value_tag: ValueTag,
        name: &str,
        value: &str,
    ) -> &mut Self {
        self.add(group_tag, value_tag, name, vec![AttrValue::String(value.to_owned())])
    }

    pub fn add_strings(
        &mut self,
        group_tag: GroupTag,
        value_tag: ValueTag,
        name: &str,
        values: &[&str],
    ) -> &mut Self {
        let values = values
            .iter()
            .map(|v| AttrValue::String((*v).to_owned()))
            .collect();
        self.add(group_tag, value_tag, name, values)
    }

    pub fn add_integer(
        &mut self,
        group_tag: GroupTag,
        value_tag: ValueTag,
        name: &str,
        value: i32,
    ) -> &mut Self {
        self.add(group_tag, value_tag, name, vec![AttrValue::Integer(value)])
    }

    pub fn add_boolean(&mut self, group_tag: GroupTag, name: &str, value: bool) -> &mut Self {
        self.add(group_tag, ValueTag::Boolean, name, vec![AttrValue::Boolean(value)])
    }

    pub fn add_separator(&mut self) -> &mut Self {
        self.attributes.push(Attribute::separator());
        self
    }

    /// First attribute with `name` in `group_tag`.
    pub fn find(&self, group_tag: GroupTag, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.group_tag == group_tag && a.name == name)
    }

    /// The server-supplied `status-message`, if the response carries one.
    pub fn status_message(&self) -> Option<&str> {
        self.find(GroupTag::Operation, "status-message")
            .and_then(|a| a.first())
            .and_then(AttrValue::as_str)
    }
}

// ---------------------------------------------------------------------------
// Operations and status codes (RFC 8011 §4, CUPS extensions)
// ---------------------------------------------------------------------------

/// Operations this client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetJobs,
    /// CUPS-Get-Default.
    CupsGetDefault,
}

impl Operation {
    pub fn id(self) -> u16 {
        match self {
            Self::GetJobs => 0x000A,
            Self::CupsGetDefault => 0x4001,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GetJobs => "Get-Jobs",
            Self::CupsGetDefault => "CUPS-Get-Default",
        }
    }
}

/// IPP status code (RFC 8011 §4.1.8 / Appendix B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: Self = Self(0x0000);
    pub const OK_IGNORED_OR_SUBSTITUTED: Self = Self(0x0001);
    pub const OK_CONFLICTING: Self = Self(0x0002);
    pub const BAD_REQUEST: Self = Self(0x0400);
    pub const FORBIDDEN: Self = Self(0x0401);
    pub const NOT_AUTHENTICATED: Self = Self(0x0402);
    pub const NOT_FOUND: Self = Self(0x0406);
    pub const INTERNAL_ERROR: Self = Self(0x0500);
    pub const OPERATION_NOT_SUPPORTED: Self = Self(0x0501);
    pub const SERVICE_UNAVAILABLE: Self = Self(0x0502);
    /// Local failure that never reached the server (CUPS `internal-error`).
    pub const LOCAL_INTERNAL: Self = Self(0x1000);

    /// Any successful-ok-* code.
    pub fn is_success(self) -> bool {
        self.0 < 0x0100
    }

    /// RFC 8011 keyword for this status, if known.
    pub fn keyword(self) -> Option<&'static str> {
        Some(match self {
            Self::OK => "successful-ok",
            Self::OK_IGNORED_OR_SUBSTITUTED => "successful-ok-ignored-or-substituted-attributes",
            Self::OK_CONFLICTING => "successful-ok-conflicting-attributes",
            Self::BAD_REQUEST => "client-error-bad-request",
            Self::FORBIDDEN => "client-error-forbidden",
            Self::NOT_AUTHENTICATED => "client-error-not-authenticated",
            Self::NOT_FOUND => "client-error-not-found",
            Self::INTERNAL_ERROR => "server-error-internal-error",
            Self::OPERATION_NOT_SUPPORTED => "server-error-operation-not-supported",
            Self::SERVICE_UNAVAILABLE => "server-error-service-unavailable",
            Self::LOCAL_INTERNAL => "internal-error",
            _ => return None,
        })
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.keyword() {
            Some(keyword) => f.write_str(keyword),
            None => write!(f, "0x{:04X}", self.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// IPP `job-state` values (RFC 8011 §5.3.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Pending,
    Held,
    Processing,
    Stopped,
    Canceled,
    Aborted,
    Completed,
}

impl JobState {
    pub fn from_ipp(value: i32) -> Option<Self> {
        match value {
            3 => Some(Self::Pending),
            4 => Some(Self::Held),
            5 => Some(Self::Processing),
            6 => Some(Self::Stopped),
            7 => Some(Self::Canceled),
            8 => Some(Self::Aborted),
            9 => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn ipp_value(self) -> i32 {
        match self {
            Self::Pending => 3,
            Self::Held => 4,
            Self::Processing => 5,
            Self::Stopped => 6,
            Self::Canceled => 7,
            Self::Aborted => 8,
            Self::Completed => 9,
        }
    }

    /// Canceled, aborted and completed jobs are finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Aborted | Self::Completed)
    }
}

/// Lifecycle filter for Get-Jobs (`which-jobs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhichJobs {
    /// Pending, held and processing jobs (server default, attribute omitted).
    #[default]
    Active,
    Completed,
    All,
}

impl WhichJobs {
    /// The `which-jobs` keyword, or `None` when the attribute is omitted.
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            Self::Active => None,
            Self::Completed => Some("completed"),
            Self::All => Some("all"),
        }
    }
}

/// A job as reported by the spooler.
///
/// Strings are owned copies; nothing here borrows from the response it was
/// decoded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Always > 0.
    pub id: i32,
    /// Destination (printer or class) name.
    pub dest: String,
    pub user: String,
    /// MIME type of the document.
    pub format: String,
    pub title: String,
    /// 1..=100.
    pub priority: i32,
    pub state: JobState,
    /// Size estimate in kilobytes (`job-k-octets`).
    pub size_kb: i32,
    /// Seconds since the Unix epoch, 0 when the server did not say.
    pub creation_time: i64,
    pub processing_time: i64,
    pub completed_time: i64,
}

impl JobRecord {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        epoch_seconds(self.creation_time)
    }

    pub fn processing_at(&self) -> Option<DateTime<Utc>> {
        epoch_seconds(self.processing_time)
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        epoch_seconds(self.completed_time)
    }
}

fn epoch_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        None
    } else {
        DateTime::from_timestamp(seconds, 0)
    }
}

/// Outcome of the most recent protocol operation on a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    pub status: StatusCode,
    pub message: Option<String>,
}

impl LastError {
    pub fn ok() -> Self {
        Self {
            status: StatusCode::OK,
            message: None,
        }
    }

    /// The message, or the status keyword when the server sent none.
    pub fn describe(&self) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None => self.status.to_string(),
        }
    }
}

impl Default for LastError {
    fn default() -> Self {
        Self::ok()
    }
}
