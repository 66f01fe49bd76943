//! Client for the compound evolver web service.
//!
//! Submits evolution runs, follows their progress by polling, and keeps
//! an `evo_core` run session in sync with what the server reports. The
//! HTTP details live behind the [`transport::JobTransport`] trait so the
//! polling controller can be driven by any transport.

pub mod api;
pub mod classify;
pub mod config;
pub mod controller;
pub mod events;
pub mod form;
pub mod messages;
pub mod transport;
