//! Command-line follower for compound evolver runs.
//!
//! [`follow`] logs engine events until the run finishes and handles
//! interrupts; [`report`] turns the finished session into a JSON document.

pub mod follow;
pub mod report;
