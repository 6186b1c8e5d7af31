//! Practice session orchestration.
//!
//! A [`ChatSession`] ties the pieces together for one process: the
//! context store, the model resource cache, and the configured budget.
//! Each user turn flows through context selection, prompt assembly,
//! and local generation, and both sides of the exchange are persisted
//! back into the store.

pub mod session;

pub use session::{ChatSession, MaintenanceReport};
