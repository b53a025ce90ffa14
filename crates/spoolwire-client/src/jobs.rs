// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job record store and the Get-Jobs operation.
//
// A `JobList` owns every string it holds. Records are appended one at a time
// from field sets that borrow from a response message; the borrowed strings
// are copied so the list outlives the response.

use spoolwire_core::error::{Result, SpoolwireError};
use spoolwire_core::types::{JobRecord, JobState, WhichJobs};
use tracing::{error, info, instrument};

use crate::decode::decode_jobs;
use crate::request::GetJobsRequest;
use crate::session::{SessionHandle, acquire_context};

/// Fields of one job while it is being decoded.
///
/// Borrows its strings; [`JobList::append`] makes the owned copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFields<'a> {
    pub id: i32,
    /// Empty until a `job-printer-uri` names the destination.
    pub dest: &'a str,
    pub user: &'a str,
    pub format: &'a str,
    pub title: &'a str,
    pub priority: i32,
    pub state: JobState,
    pub size_kb: i32,
    pub creation_time: i64,
    pub processing_time: i64,
    pub completed_time: i64,
}

impl Default for JobFields<'_> {
    fn default() -> Self {
        Self {
            id: 0,
            dest: "",
            user: "unknown",
            format: "application/octet-stream",
            title: "untitled",
            priority: 50,
            state: JobState::Pending,
            size_kb: 0,
            creation_time: 0,
            processing_time: 0,
            completed_time: 0,
        }
    }
}

impl JobFields<'_> {
    /// A job is kept only with a positive id and a named destination.
    pub fn is_complete(&self) -> bool {
        self.id > 0 && !self.dest.is_empty()
    }
}

#[cfg(test)]
thread_local! {
    /// Records a list may hold before `append` reports an allocation failure.
    pub(crate) static APPEND_LIMIT: std::cell::Cell<Option<usize>> =
        const { std::cell::Cell::new(None) };
}

/// Caller-owned jobs in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobList {
    records: Vec<JobRecord>,
}

impl JobList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record, copying every borrowed string.
    pub fn append(&mut self, fields: &JobFields<'_>) -> Result<()> {
        #[cfg(test)]
        if APPEND_LIMIT.with(|limit| limit.get().is_some_and(|max| self.records.len() >= max)) {
            return Err(SpoolwireError::Allocation("job list: capacity limit reached".into()));
        }
        self.records
            .try_reserve(1)
            .map_err(|e| SpoolwireError::Allocation(format!("job list: {e}")))?;
        let record = JobRecord {
            id: fields.id,
            dest: owned(fields.dest)?,
            user: owned(fields.user)?,
            format: owned(fields.format)?,
            title: owned(fields.title)?,
            priority: fields.priority,
            state: fields.state,
            size_kb: fields.size_kb,
            creation_time: fields.creation_time,
            processing_time: fields.processing_time,
            completed_time: fields.completed_time,
        };
        self.records.push(record);
        Ok(())
    }

    /// Free every record and the list itself.
    ///
    /// Returns how many records were freed. Taking `self` by value means a
    /// list cannot be released twice.
    pub fn release(self) -> usize {
        let freed = self.records.len();
        drop(self);
        freed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&JobRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, JobRecord> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[JobRecord] {
        &self.records
    }

    pub fn into_vec(self) -> Vec<JobRecord> {
        self.records
    }

    /// Export the records as a JSON array, in list order.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.records)?)
    }

    /// Rebuild a list from [`to_json`](Self::to_json) output.
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<JobRecord> = serde_json::from_str(json)?;
        Ok(Self { records })
    }
}

impl std::ops::Index<usize> for JobList {
    type Output = JobRecord;

    fn index(&self, index: usize) -> &JobRecord {
        &self.records[index]
    }
}

impl IntoIterator for JobList {
    type Item = JobRecord;
    type IntoIter = std::vec::IntoIter<JobRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a JobList {
    type Item = &'a JobRecord;
    type IntoIter = std::slice::Iter<'a, JobRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Release a list that may not exist. Returns 0 for `None`.
pub fn release_list(list: Option<JobList>) -> usize {
    list.map_or(0, JobList::release)
}

fn owned(s: &str) -> Result<String> {
    let mut out = String::new();
    out.try_reserve_exact(s.len())
        .map_err(|e| SpoolwireError::Allocation(format!("{}-byte job field: {e}", s.len())))?;
    out.push_str(s);
    Ok(out)
}

impl SessionHandle {
    /// List jobs through this session.
    ///
    /// `Ok` with an empty list means the server has no matching jobs; a
    /// failed request is an `Err`, and the session's last error says why.
    #[instrument(skip(self), fields(context = %self.id()))]
    pub fn get_jobs(&self, dest: Option<&str>, my_jobs: bool, which: WhichJobs) -> Result<JobList> {
        let request = GetJobsRequest::new(self.user())
            .dest(dest)
            .my_jobs(my_jobs)
            .which(which)
            .build(self.next_request_id());

        let outcome = self
            .send(&request, "/")
            .and_then(|response| decode_jobs(&response));

        match &outcome {
            Ok(jobs) => info!(count = jobs.len(), "Get-Jobs complete"),
            Err(e) => error!(status = %e.status(), error = %e, "Get-Jobs failed"),
        }
        self.record(outcome)
    }
}

/// List jobs through the calling thread's session.
pub fn get_jobs(dest: Option<&str>, my_jobs: bool, which: WhichJobs) -> Result<JobList> {
    acquire_context()?.get_jobs(dest, my_jobs, which)
}
