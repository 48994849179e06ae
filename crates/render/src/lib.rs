//! Remote video render tasks: multipart submission, vendor status
//! normalization and the long-running poller.

pub mod api;
pub mod error;
pub mod poller;
pub mod status;
