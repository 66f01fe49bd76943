//! Domain logic for following a compound evolution run.
//!
//! Everything here is synchronous and free of I/O: the data model the
//! server sends, the append-only generation ledger, the incremental
//! aggregate views that feed the charts, and the run session state
//! machine that the polling controller in `evo-client` drives.

pub mod aggregates;
pub mod candidate;
pub mod error;
pub mod run;
pub mod snapshot;
pub mod store;
pub mod types;
