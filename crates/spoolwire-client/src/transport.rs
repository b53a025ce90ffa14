// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transport seam between sessions and the spooler.
//
// A session only ever sees the binary outcome of a request: a complete
// response message, or a failure. Framing, connection management and request
// deadlines live behind `Connection`; the core never cancels a request.
//
// `HttpTransport` is the stock implementation. It hands each request to the
// blocking `ipp` client (IPP over HTTP POST, RFC 8010 §4) and projects the
// parsed response back into an `AttributeMessage`, one run per attribute
// group.

use std::collections::HashMap;
use std::time::Duration;

use ipp::prelude::*;
use ipp::model::Operation as IppOperation;
use tracing::{debug, instrument, warn};

use spoolwire_core::config::ClientConfig;
use spoolwire_core::error::{Result, SpoolwireError};
use spoolwire_core::types::{
    AttrValue, Attribute, AttributeMessage, GroupTag, Operation, StatusCode as Status, ValueTag,
};

/// Default request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Dials connections to the default server.
pub trait Transport: Send + Sync {
    fn connect_default(&self, config: &ClientConfig) -> Result<Box<dyn Connection>>;
}

/// An open connection owned by exactly one session.
pub trait Connection {
    /// Send `request` to `resource` and wait for the full response.
    ///
    /// `scratch` is a buffer on loan from the session's pool for
    /// implementations that frame bytes themselves; its contents on entry and
    /// exit are unspecified.
    fn send_request(
        &mut self,
        request: &AttributeMessage,
        resource: &str,
        scratch: &mut Vec<u8>,
    ) -> Result<AttributeMessage>;

    /// Release the underlying resources. Called once at session teardown.
    fn close(&mut self) {}
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

/// IPP over plain HTTP via the `ipp` crate's blocking client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    timeout: Duration,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl HttpTransport {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Transport for HttpTransport {
    fn connect_default(&self, config: &ClientConfig) -> Result<Box<dyn Connection>> {
        Ok(Box::new(HttpConnection::new(config, self.timeout)))
    }
}

/// The session's link to one spooler.
///
/// Holds one client per resource path so repeated requests to the same path
/// reuse the client's keep-alive agent.
pub struct HttpConnection {
    authority: String,
    timeout: Duration,
    clients: HashMap<String, IppClient>,
}

impl HttpConnection {
    pub fn new(config: &ClientConfig, timeout: Duration) -> Self {
        Self {
            authority: config.authority(),
            timeout,
            clients: HashMap::new(),
        }
    }

    fn client(&mut self, resource: &str) -> Result<&IppClient> {
        if !self.clients.contains_key(resource) {
            let target = format!("ipp://{}{resource}", self.authority);
            let uri: Uri = target
                .parse()
                .map_err(|e| SpoolwireError::Transport(format!("invalid URI '{target}': {e}")))?;
            let client = IppClient::builder(uri).request_timeout(self.timeout).build();
            debug!(uri = %target, "client ready");
            self.clients.insert(resource.to_string(), client);
        }
        self.clients
            .get(resource)
            .ok_or_else(|| SpoolwireError::Transport("connection unavailable".into()))
    }
}

impl Connection for HttpConnection {
    #[instrument(skip_all, fields(server = %self.authority, resource = %resource, request_id = request.request_id))]
    fn send_request(
        &mut self,
        request: &AttributeMessage,
        resource: &str,
        _scratch: &mut Vec<u8>,
    ) -> Result<AttributeMessage> {
        let outgoing = to_ipp(request)?;
        let client = self.client(resource)?;

        let response = match client.send(outgoing) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "request failed, dropping connection");
                self.close();
                return Err(SpoolwireError::Transport(e.to_string()));
            }
        };

        let response = from_ipp(&response);
        if response.request_id != request.request_id {
            warn!(
                sent = request.request_id,
                received = response.request_id,
                "response request-id mismatch"
            );
        }
        Ok(response)
    }

    fn close(&mut self) {
        if !self.clients.is_empty() {
            self.clients.clear();
            debug!(server = %self.authority, "connection closed");
        }
    }
}

// ---------------------------------------------------------------------------
// Message conversion
// ---------------------------------------------------------------------------

/// Build the wire request for `message`.
///
/// `attributes-charset` and `attributes-natural-language` are supplied by
/// the `ipp` request itself and always lead the operation group. Separators
/// carry no data in a request and are skipped.
pub fn to_ipp(message: &AttributeMessage) -> Result<IppRequestResponse> {
    let operation = match message.code {
        code if code == Operation::GetJobs.id() => IppOperation::GetJobs,
        code if code == Operation::CupsGetDefault.id() => IppOperation::CupsGetDefault,
        other => {
            return Err(SpoolwireError::Transport(format!(
                "unsupported operation 0x{other:04x}"
            )));
        }
    };

    let mut request = IppRequestResponse::new(IppVersion::v1_1(), operation, None);
    request.header_mut().request_id = message.request_id;

    for attribute in message.attributes.iter().filter(|a| !a.is_separator()) {
        let group = delimiter(attribute.group_tag)?;
        let value = ipp_value(attribute)?;
        request
            .attributes_mut()
            .add(group, IppAttribute::new(&attribute.name, value));
    }
    Ok(request)
}

/// Project a parsed response into an attribute sequence.
///
/// Every group the parser opened becomes one run. Two adjacent groups with
/// the same tag are split by a separator so each job stays its own run.
/// Attribute order inside a group is not preserved.
pub fn from_ipp(response: &IppRequestResponse) -> AttributeMessage {
    let header = response.header();
    let mut message =
        AttributeMessage::response(Status(header.operation_or_status), header.request_id);

    let mut previous: Option<GroupTag> = None;
    for group in response.attributes().groups() {
        let tag = GroupTag::from_u8(group.tag() as u8);
        if previous == Some(tag) {
            message.add_separator();
        }
        previous = Some(tag);

        for attribute in group.attributes().values() {
            let (value_tag, values) = attr_values(attribute.value());
            message.add(tag, value_tag, attribute.name(), values);
        }
    }
    message
}

fn delimiter(tag: GroupTag) -> Result<DelimiterTag> {
    match tag {
        GroupTag::Operation => Ok(DelimiterTag::OperationAttributes),
        GroupTag::Job => Ok(DelimiterTag::JobAttributes),
        GroupTag::Printer => Ok(DelimiterTag::PrinterAttributes),
        GroupTag::Unsupported => Ok(DelimiterTag::UnsupportedAttributes),
        other => Err(SpoolwireError::Transport(format!(
            "group 0x{:02x} cannot carry attributes",
            other.as_u8()
        ))),
    }
}

fn ipp_value(attribute: &Attribute) -> Result<IppValue> {
    let mut values = Vec::with_capacity(attribute.values.len());
    for value in &attribute.values {
        values.push(single_value(attribute, value)?);
    }
    match values.len() {
        0 => Ok(IppValue::NoValue),
        1 => Ok(values.remove(0)),
        _ => Ok(IppValue::Array(values)),
    }
}

fn single_value(attribute: &Attribute, value: &AttrValue) -> Result<IppValue> {
    let converted = match (attribute.value_tag, value) {
        (ValueTag::Integer, AttrValue::Integer(n)) => IppValue::Integer(*n),
        (ValueTag::Enum, AttrValue::Integer(n)) => IppValue::Enum(*n),
        (ValueTag::Boolean, AttrValue::Boolean(b)) => IppValue::Boolean(*b),
        (ValueTag::Text, AttrValue::String(s)) => IppValue::TextWithoutLanguage(s.clone()),
        (ValueTag::Name, AttrValue::String(s)) => IppValue::NameWithoutLanguage(s.clone()),
        (ValueTag::Keyword, AttrValue::String(s)) => IppValue::Keyword(s.clone()),
        (ValueTag::Uri, AttrValue::String(s)) => IppValue::Uri(s.clone()),
        (ValueTag::Charset, AttrValue::String(s)) => IppValue::Charset(s.clone()),
        (ValueTag::NaturalLanguage, AttrValue::String(s)) => IppValue::NaturalLanguage(s.clone()),
        (ValueTag::MimeMediaType, AttrValue::String(s)) => IppValue::MimeMediaType(s.clone()),
        (tag, _) => {
            return Err(SpoolwireError::Transport(format!(
                "cannot encode '{}' with value tag 0x{:02x}",
                attribute.name,
                tag.as_u8()
            )));
        }
    };
    Ok(converted)
}

fn attr_values(value: &IppValue) -> (ValueTag, Vec<AttrValue>) {
    if let IppValue::Array(items) = value {
        let mut tag = None;
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            let (item_tag, item_value) = single_attr_value(item);
            tag.get_or_insert(item_tag);
            values.push(item_value);
        }
        return (tag.unwrap_or(ValueTag::Other(value.to_tag())), values);
    }
    let (tag, single) = single_attr_value(value);
    (tag, vec![single])
}

fn single_attr_value(value: &IppValue) -> (ValueTag, AttrValue) {
    match value {
        IppValue::Integer(n) => (ValueTag::Integer, AttrValue::Integer(*n)),
        IppValue::Enum(n) => (ValueTag::Enum, AttrValue::Integer(*n)),
        IppValue::Boolean(b) => (ValueTag::Boolean, AttrValue::Boolean(*b)),
        IppValue::TextWithoutLanguage(s) => (ValueTag::Text, AttrValue::String(s.to_string())),
        IppValue::TextWithLanguage { text, .. } => {
            (ValueTag::Text, AttrValue::String(text.to_string()))
        }
        IppValue::NameWithoutLanguage(s) => (ValueTag::Name, AttrValue::String(s.to_string())),
        IppValue::NameWithLanguage { name, .. } => {
            (ValueTag::Name, AttrValue::String(name.to_string()))
        }
        IppValue::Keyword(s) => (ValueTag::Keyword, AttrValue::String(s.to_string())),
        IppValue::Uri(s) => (ValueTag::Uri, AttrValue::String(s.to_string())),
        IppValue::Charset(s) => (ValueTag::Charset, AttrValue::String(s.to_string())),
        IppValue::NaturalLanguage(s) => {
            (ValueTag::NaturalLanguage, AttrValue::String(s.to_string()))
        }
        IppValue::MimeMediaType(s) => (ValueTag::MimeMediaType, AttrValue::String(s.to_string())),
        other => (
            ValueTag::Other(other.to_tag()),
            AttrValue::Raw(other.to_string().into_bytes()),
        ),
    }
}
