//! Services over the document store, one module per entity.

pub mod agents;
pub mod drafts;
pub mod procedures;
pub mod requisitions;
pub mod units;
pub mod users;
