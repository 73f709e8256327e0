//! Partition catalog and physical table naming.

mod catalog;
pub mod naming;

pub use catalog::PgPartitionCatalog;
