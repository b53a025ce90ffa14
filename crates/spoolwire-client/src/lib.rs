// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolwire Client — per-thread IPP sessions, Get-Jobs listing, and default
// destination lookup against a CUPS-compatible spooler. Domain types live in
// `spoolwire-core`; this crate owns the session state, the directory and
// configuration resolution, and the wire plumbing.

pub mod buffers;
pub mod config;
pub mod decode;
pub mod defaults;
pub mod dirs;
pub mod jobs;
pub mod registry;
pub mod request;
pub mod session;
pub mod transport;

pub use decode::{decode_default_destination, decode_jobs};
pub use defaults::resolve_default_destination;
pub use dirs::{Directories, Environment, PlatformDirs, SystemEnvironment};
pub use jobs::{JobFields, JobList, get_jobs, release_list};
pub use registry::{ContextId, lock_global, set_server, set_transport, set_user};
pub use request::GetJobsRequest;
pub use session::{SessionHandle, acquire_context, last_error};
pub use transport::{Connection, HttpConnection, HttpTransport, Transport};
