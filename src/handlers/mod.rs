// Handler modules
pub mod audit;
pub mod autofix;
pub mod utils;

// Re-export all handler functions
pub use audit::{AuditOptions, handle_audit};
pub use autofix::{AutofixOptions, handle_autofix};
pub use utils::Outcome;
