//! This crate exists only to host workspace-root end-to-end tests under
//! `tests/`; see the scenarios there for what's actually exercised.
