//! Backend implementations.
//!
//! The concrete backend is selected at compile time through the
//! `backend_impl` type aliases; runtime requests for a backend that is not
//! compiled in fall back along [`crate::BACKEND_PROBE_ORDER`]. This build
//! carries the software reference backend only.

pub mod software;
pub(crate) use software::backend_impl::*;
