// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Projection of response attribute sequences into typed results.
//
// Job attributes arrive as runs: consecutive attributes tagged `job` belong to
// one job, and a run ends at any other group tag, at a separator, or at the
// end of the message. Each run is matched field by field on (name, value
// tag). Fields with the wrong value tag, and names this crate does not know,
// are skipped. A run without a positive `job-id` or without a destination is
// dropped; it never fails the listing.

use spoolwire_core::error::{Result, SpoolwireError};
use spoolwire_core::types::{
    AttrValue, Attribute, AttributeMessage, GroupTag, JobState, ValueTag,
};
use tracing::{debug, warn};

use crate::jobs::{JobFields, JobList};

/// Decode a Get-Jobs response into the jobs it lists.
pub fn decode_jobs(response: &AttributeMessage) -> Result<JobList> {
    check_status(response)?;

    let mut jobs = JobList::new();
    let mut attributes = response.attributes.iter().peekable();

    while let Some(attribute) = attributes.next() {
        if attribute.group_tag != GroupTag::Job {
            continue;
        }

        let mut fields = JobFields::default();
        apply(&mut fields, attribute);
        while let Some(next) = attributes.next_if(|a| a.group_tag == GroupTag::Job) {
            apply(&mut fields, next);
        }

        if !fields.is_complete() {
            debug!(id = fields.id, dest = fields.dest, "dropping incomplete job entry");
            continue;
        }

        if let Err(e) = jobs.append(&fields) {
            let freed = jobs.release();
            warn!(freed, error = %e, "aborting job decode");
            return Err(e);
        }
    }

    debug!(count = jobs.len(), "decoded jobs");
    Ok(jobs)
}

/// The `printer-name` from a CUPS-Get-Default response.
///
/// `Ok(None)` when the server answered without naming a destination.
pub fn decode_default_destination(response: &AttributeMessage) -> Result<Option<String>> {
    check_status(response)?;

    let name = response
        .attributes
        .iter()
        .filter(|a| a.name == "printer-name" && a.value_tag == ValueTag::Name)
        .find_map(|a| a.first().and_then(AttrValue::as_str))
        .map(str::to_owned);
    Ok(name)
}

fn check_status(response: &AttributeMessage) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    Err(SpoolwireError::Protocol {
        status,
        message: response.status_message().map(str::to_owned),
    })
}

fn apply<'a>(fields: &mut JobFields<'a>, attribute: &'a Attribute) {
    let Some(value) = attribute.first() else {
        return;
    };

    match (attribute.name.as_str(), attribute.value_tag) {
        ("job-id", ValueTag::Integer) => {
            if let Some(id) = value.as_integer() {
                fields.id = id;
            }
        }
        ("job-state", ValueTag::Enum) => {
            match value.as_integer().and_then(JobState::from_ipp) {
                Some(state) => fields.state = state,
                None => debug!(value = ?value, "ignoring unknown job-state"),
            }
        }
        ("job-priority", ValueTag::Integer) => match value.as_integer() {
            Some(priority @ 1..=100) => fields.priority = priority,
            other => debug!(value = ?other, "ignoring out-of-range job-priority"),
        },
        ("job-k-octets", ValueTag::Integer) => {
            if let Some(size) = value.as_integer() {
                fields.size_kb = size;
            }
        }
        ("time-at-completed", ValueTag::Integer) => {
            if let Some(t) = value.as_integer() {
                fields.completed_time = i64::from(t);
            }
        }
        ("time-at-creation", ValueTag::Integer) => {
            if let Some(t) = value.as_integer() {
                fields.creation_time = i64::from(t);
            }
        }
        ("time-at-processing", ValueTag::Integer) => {
            if let Some(t) = value.as_integer() {
                fields.processing_time = i64::from(t);
            }
        }
        ("job-printer-uri", ValueTag::Uri) => {
            if let Some(dest) = value.as_str().and_then(final_segment) {
                fields.dest = dest;
            }
        }
        ("job-originating-user-name", ValueTag::Name) => {
            if let Some(user) = value.as_str() {
                fields.user = user;
            }
        }
        ("document-format", ValueTag::MimeMediaType) => {
            if let Some(format) = value.as_str() {
                fields.format = format;
            }
        }
        ("job-name", ValueTag::Text | ValueTag::Name) => {
            if let Some(title) = value.as_str() {
                fields.title = title;
            }
        }
        _ => {}
    }
}

/// Last path segment of a printer URI, `None` when it is empty.
fn final_segment(uri: &str) -> Option<&str> {
    uri.rsplit('/').next().filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use spoolwire_core::types::StatusCode;

    use super::*;
    use crate::jobs::APPEND_LIMIT;

    fn ok() -> AttributeMessage {
        let mut response = AttributeMessage::response(StatusCode::OK, 1);
        response
            .add_string(GroupTag::Operation, ValueTag::Charset, "attributes-charset", "utf-8")
            .add_string(
                GroupTag::Operation,
                ValueTag::NaturalLanguage,
                "attributes-natural-language",
                "en",
            );
        response
    }

    fn uri(dest: &str) -> String {
        format!("ipp://localhost/printers/{dest}")
    }

    #[test]
    fn no_job_attributes_is_an_empty_list() {
        let mut response = ok();
        response.add_string(GroupTag::Printer, ValueTag::Name, "printer-name", "printA");
        let jobs = decode_jobs(&response).expect("decode");
        assert!(jobs.is_empty());
        assert_eq!(jobs.len(), 0);
    }

    #[test]
    fn fully_populated_job_round_trips() {
        let mut response = ok();
        response
            .add_integer(GroupTag::Job, ValueTag::Integer, "job-id", 42)
            .add_string(GroupTag::Job, ValueTag::Uri, "job-printer-uri", &uri("office"))
            .add_string(GroupTag::Job, ValueTag::Name, "job-originating-user-name", "bob")
            .add_string(GroupTag::Job, ValueTag::MimeMediaType, "document-format", "text/plain")
            .add_string(GroupTag::Job, ValueTag::Name, "job-name", "report.txt")
            .add_integer(GroupTag::Job, ValueTag::Integer, "job-priority", 80)
            .add_integer(GroupTag::Job, ValueTag::Enum, "job-state", 5)
            .add_integer(GroupTag::Job, ValueTag::Integer, "job-k-octets", 12)
            .add_integer(GroupTag::Job, ValueTag::Integer, "time-at-creation", 1_700_000_000)
            .add_integer(GroupTag::Job, ValueTag::Integer, "time-at-processing", 1_700_000_010)
            .add_integer(GroupTag::Job, ValueTag::Integer, "time-at-completed", 1_700_000_020);

        let jobs = decode_jobs(&response).expect("decode");
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.id, 42);
        assert_eq!(job.dest, "office");
        assert_eq!(job.user, "bob");
        assert_eq!(job.format, "text/plain");
        assert_eq!(job.title, "report.txt");
        assert_eq!(job.priority, 80);
        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.size_kb, 12);
        assert_eq!(job.creation_time, 1_700_000_000);
        assert_eq!(job.processing_time, 1_700_000_010);
        assert_eq!(job.completed_time, 1_700_000_020);
        assert_eq!(
            job.created_at().map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn two_jobs_second_without_destination() {
        let mut response = ok();
        response
            .add_integer(GroupTag::Job, ValueTag::Integer, "job-id", 7)
            .add_string(GroupTag::Job, ValueTag::Uri, "job-printer-uri", &uri("printA"))
            .add_string(GroupTag::Job, ValueTag::Name, "job-originating-user-name", "alice")
            .add_string(GroupTag::Job, ValueTag::MimeMediaType, "document-format", "application/pdf")
            .add_separator()
            .add_integer(GroupTag::Job, ValueTag::Integer, "job-id", 8);

        let jobs = decode_jobs(&response).expect("decode");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, 7);
        assert_eq!(jobs[0].dest, "printA");
        assert_eq!(jobs[0].user, "alice");
        assert_eq!(jobs[0].format, "application/pdf");
    }

    #[test]
    fn missing_or_zero_id_is_dropped() {
        let mut response = ok();
        response
            .add_string(GroupTag::Job, ValueTag::Uri, "job-printer-uri", &uri("a"))
            .add_separator()
            .add_integer(GroupTag::Job, ValueTag::Integer, "job-id", 0)
            .add_string(GroupTag::Job, ValueTag::Uri, "job-printer-uri", &uri("b"))
            .add_separator()
            .add_integer(GroupTag::Job, ValueTag::Integer, "job-id", 3)
            .add_string(GroupTag::Job, ValueTag::Uri, "job-printer-uri", &uri("c"));

        let jobs = decode_jobs(&response).expect("decode");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].dest, "c");
    }

    #[test]
    fn mismatched_value_tags_are_ignored() {
        let mut response = ok();
        response
            .add_integer(GroupTag::Job, ValueTag::Integer, "job-id", 5)
            .add_string(GroupTag::Job, ValueTag::Uri, "job-printer-uri", &uri("p"))
            .add_string(GroupTag::Job, ValueTag::Text, "job-originating-user-name", "mallory")
            .add_integer(GroupTag::Job, ValueTag::Integer, "job-state", 9)
            .add_string(GroupTag::Job, ValueTag::Keyword, "document-format", "image/png")
            .add_string(GroupTag::Job, ValueTag::Text, "job-priority", "99")
            .add_string(GroupTag::Job, ValueTag::Keyword, "x-vendor-extension", "whatever");

        let jobs = decode_jobs(&response).expect("decode");
        let job = &jobs[0];
        assert_eq!(job.user, "unknown");
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.format, "application/octet-stream");
        assert_eq!(job.priority, 50);
    }

    #[test]
    fn out_of_range_priority_and_unknown_state_keep_defaults() {
        let mut response = ok();
        response
            .add_integer(GroupTag::Job, ValueTag::Integer, "job-id", 5)
            .add_string(GroupTag::Job, ValueTag::Uri, "job-printer-uri", &uri("p"))
            .add_integer(GroupTag::Job, ValueTag::Integer, "job-priority", 500)
            .add_integer(GroupTag::Job, ValueTag::Enum, "job-state", 42);

        let jobs = decode_jobs(&response).expect("decode");
        assert_eq!(jobs[0].priority, 50);
        assert_eq!(jobs[0].state, JobState::Pending);
    }

    #[test]
    fn group_change_ends_a_job() {
        let mut response = ok();
        response
            .add_integer(GroupTag::Job, ValueTag::Integer, "job-id", 1)
            .add_string(GroupTag::Printer, ValueTag::Name, "printer-name", "ignored")
            .add_string(GroupTag::Job, ValueTag::Uri, "job-printer-uri", &uri("late"));

        // The destination lands in a second run with no id, so neither commits.
        let jobs = decode_jobs(&response).expect("decode");
        assert!(jobs.is_empty());
    }

    #[test]
    fn empty_final_segment_is_no_destination() {
        let mut response = ok();
        response
            .add_integer(GroupTag::Job, ValueTag::Integer, "job-id", 1)
            .add_string(GroupTag::Job, ValueTag::Uri, "job-printer-uri", "ipp://localhost/printers/");
        assert!(decode_jobs(&response).expect("decode").is_empty());
        assert_eq!(final_segment("ipp://h/classes/all"), Some("all"));
    }

    #[test]
    fn error_status_is_a_protocol_error() {
        let mut response = AttributeMessage::response(StatusCode::NOT_FOUND, 1);
        response.add_string(
            GroupTag::Operation,
            ValueTag::Text,
            "status-message",
            "The printer or class does not exist.",
        );

        match decode_jobs(&response) {
            Err(SpoolwireError::Protocol { status, message }) => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(message.as_deref(), Some("The printer or class does not exist."));
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn success_with_warnings_still_decodes() {
        let mut response = AttributeMessage::response(StatusCode::OK_IGNORED_OR_SUBSTITUTED, 1);
        response
            .add_integer(GroupTag::Job, ValueTag::Integer, "job-id", 2)
            .add_string(GroupTag::Job, ValueTag::Uri, "job-printer-uri", &uri("p"));
        assert_eq!(decode_jobs(&response).expect("decode").len(), 1);
    }

    #[test]
    fn append_failure_releases_the_partial_list() {
        let mut response = ok();
        for id in 1..=3 {
            response
                .add_integer(GroupTag::Job, ValueTag::Integer, "job-id", id)
                .add_string(GroupTag::Job, ValueTag::Uri, "job-printer-uri", &uri("p"))
                .add_separator();
        }

        APPEND_LIMIT.with(|limit| limit.set(Some(2)));
        let outcome = decode_jobs(&response);
        APPEND_LIMIT.with(|limit| limit.set(None));

        let err = outcome.expect_err("third append fails");
        assert!(matches!(err, SpoolwireError::Allocation(_)));
        assert_eq!(err.status(), StatusCode::LOCAL_INTERNAL);

        // the same response decodes in full once appends succeed again
        assert_eq!(decode_jobs(&response).expect("decode").len(), 3);
    }

    #[test]
    fn default_destination_takes_first_printer_name() {
        let mut response = ok();
        response
            .add_string(GroupTag::Printer, ValueTag::Keyword, "printer-name", "wrong-type")
            .add_string(GroupTag::Printer, ValueTag::Name, "printer-name", "office");
        assert_eq!(
            decode_default_destination(&response).expect("decode").as_deref(),
            Some("office")
        );

        assert_eq!(decode_default_destination(&ok()).expect("decode"), None);

        let missing = AttributeMessage::response(StatusCode::NOT_FOUND, 1);
        assert!(decode_default_destination(&missing).is_err());
    }
}
