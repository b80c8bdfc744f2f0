//! The derived-state cache and synchronization engine: everything between
//! the persisted user record and the external ML engine.

pub mod handlers;
pub mod repair;
pub mod skills;
pub mod store;
pub mod submission;
pub mod visualization;

#[cfg(test)]
pub mod testing;
