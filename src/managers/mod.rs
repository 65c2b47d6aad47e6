// Glazyr state managers
// Managers own stateful records: open capture sessions and the capture history.

pub mod capture_store;
pub mod session_registry;
