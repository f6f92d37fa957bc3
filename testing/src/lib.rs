//! Shared test fixtures for the agency-sync workspace.
//!
//! [`FakeCloud`] is an in-process stand-in for the IAM and enterprise-project
//! APIs: a wiremock server whose single responder keeps roles, projects,
//! bindings and agencies in memory and records every call it receives.

mod cloud;
mod fixtures;

pub use cloud::*;
pub use fixtures::*;
