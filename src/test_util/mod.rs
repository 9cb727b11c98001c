//! Helpers for testing code on top of sessions. They are part of the regular API so applications
//!  can use them in their own tests.

pub mod sessions;
