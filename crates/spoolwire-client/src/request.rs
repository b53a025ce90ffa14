// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request builders for the operations this crate issues:
//   - Get-Jobs          (RFC 8011 §4.2.6)
//   - CUPS-Get-Default  (CUPS extension 0x4001)
//
// Only operation-specific attributes are added here. `attributes-charset` and
// `attributes-natural-language` are prepended by the transport.

use spoolwire_core::types::{AttributeMessage, GroupTag, Operation, ValueTag, WhichJobs};

/// Target of requests that are not scoped to a destination.
pub const ROOT_URI: &str = "ipp://localhost/";

/// Prefix of destination-scoped printer URIs.
pub const PRINTERS_URI: &str = "ipp://localhost/printers/";

/// Job attributes requested by Get-Jobs, in the order they are sent.
pub const JOB_ATTRIBUTES: [&str; 11] = [
    "document-format",
    "job-id",
    "job-k-octets",
    "job-name",
    "job-originating-user-name",
    "job-printer-uri",
    "job-priority",
    "job-state",
    "time-at-completed",
    "time-at-creation",
    "time-at-processing",
];

/// Parameters of a Get-Jobs request.
#[derive(Debug, Clone, Default)]
pub struct GetJobsRequest {
    /// Destination to list, or every destination when `None`.
    pub dest: Option<String>,
    /// Sent as `requesting-user-name`.
    pub user: String,
    /// Restrict the listing to the requesting user's jobs.
    pub my_jobs: bool,
    pub which: WhichJobs,
}

impl GetJobsRequest {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    pub fn dest(mut self, dest: Option<&str>) -> Self {
        self.dest = dest.map(str::to_owned);
        self
    }

    pub fn my_jobs(mut self, my_jobs: bool) -> Self {
        self.my_jobs = my_jobs;
        self
    }

    pub fn which(mut self, which: WhichJobs) -> Self {
        self.which = which;
        self
    }

    /// The `printer-uri` this request targets.
    pub fn printer_uri(&self) -> String {
        match self.dest.as_deref() {
            Some(dest) => printer_uri(dest),
            None => ROOT_URI.to_string(),
        }
    }

    /// Build the attribute message.
    pub fn build(&self, request_id: u32) -> AttributeMessage {
        let mut message = AttributeMessage::request(Operation::GetJobs, request_id);
        message
            .add_string(GroupTag::Operation, ValueTag::Uri, "printer-uri", &self.printer_uri())
            .add_string(
                GroupTag::Operation,
                ValueTag::Name,
                "requesting-user-name",
                &self.user,
            );

        if self.my_jobs {
            message.add_boolean(GroupTag::Operation, "my-jobs", true);
        }

        if let Some(keyword) = self.which.keyword() {
            message.add_string(GroupTag::Operation, ValueTag::Keyword, "which-jobs", keyword);
        }

        message.add_strings(
            GroupTag::Operation,
            ValueTag::Keyword,
            "requested-attributes",
            &JOB_ATTRIBUTES,
        );
        message
    }
}

/// CUPS-Get-Default asking only for the destination name.
pub fn default_destination_request(user: &str, request_id: u32) -> AttributeMessage {
    let mut message = AttributeMessage::request(Operation::CupsGetDefault, request_id);
    message
        .add_string(
            GroupTag::Operation,
            ValueTag::Name,
            "requesting-user-name",
            user,
        )
        .add_string(
            GroupTag::Operation,
            ValueTag::Keyword,
            "requested-attributes",
            "printer-name",
        );
    message
}

/// `ipp://localhost/printers/<dest>` with `dest` percent-encoded.
pub fn printer_uri(dest: &str) -> String {
    let mut uri = String::with_capacity(PRINTERS_URI.len() + dest.len());
    uri.push_str(PRINTERS_URI);
    for byte in dest.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            uri.push(byte as char);
        } else {
            uri.push_str(&format!("%{byte:02X}"));
        }
    }
    uri
}
