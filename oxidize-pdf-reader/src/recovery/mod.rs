//! Recovery of damaged documents
//!
//! When the cross-reference data cannot be parsed, the document can still be
//! opened by rebuilding the table from the object headers in the file body.

mod xref_recovery;

pub use xref_recovery::{RecoveredXRef, RecoveryStats, XRefRecovery};
