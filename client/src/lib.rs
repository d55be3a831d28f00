//! # client
//!
//! Application layer of the bookmark manager: the login gate and the live
//! dashboard, written against the `backend` service traits so any host (the
//! `marks` CLI, a test) can drive them.
//!
//! Hosts supply a [`nav::Navigator`] and observe dashboard state through a
//! `watch` receiver.

pub mod nav;
pub mod pages;
pub mod refetch;
pub mod state;

pub use nav::{LastRoute, Navigator, Route};
pub use pages::dashboard::{AddOutcome, Dashboard, InitOutcome};
pub use pages::login::{GateOutcome, SessionGate};
pub use state::dashboard::{DashboardState, Phase};

#[cfg(test)]
pub(crate) mod test_support;
