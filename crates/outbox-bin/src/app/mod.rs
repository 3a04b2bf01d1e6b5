//! Application wiring and lifecycle management.

mod ingest;
mod init;
mod lifecycle;
mod signals;

pub use ingest::ingest_file;
pub use init::{run_dispatcher, run_once};
pub use lifecycle::print_status;
