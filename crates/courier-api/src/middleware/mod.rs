//! HTTP middleware.

pub mod correlation;
