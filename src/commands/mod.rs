//! The four top-level operations the command surface exposes, plus
//! `purge`, each a thin function from `(Config, Archive-bytes,
//! arguments)` to a structured result. These functions take explicit
//! arguments and return explicit results, never touch `std::env` or
//! print directly, so the CLI binary and any other caller can drive
//! them identically.

mod add;
mod delete;
mod extract;
mod list;
mod purge;
mod test;

pub use add::{add, AddOutcome};
pub use delete::{delete, DeleteOutcome};
pub use extract::{extract, ExtractOutcome};
pub use list::{list, ListEntry};
pub use purge::{purge, PurgeOutcome};
pub use test::{test, TestOutcome};
