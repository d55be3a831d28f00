//! Screen view-models. Each drives one screen against the backend seams and
//! leaves rendering to the host.

pub mod dashboard;
pub mod login;
