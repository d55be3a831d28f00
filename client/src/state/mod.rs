//! View state for the client screens.
//!
//! DESIGN
//! ======
//! State types are plain data. The view-models in `pages` own them behind a
//! `watch` channel so hosts can observe every change.

pub mod dashboard;
