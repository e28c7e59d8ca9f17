//! LedgerGuard shared types
//!
//! Identifiers, risk/pattern/action enums, the error taxonomy, the
//! authorization seam, the event model, and the report digest helper.
//! Every subsystem crate depends on this one and nothing else below it.

#![deny(unsafe_code)]

mod authz;
mod digest;
mod error;
mod event;
mod ids;
mod risk;

pub use authz::{AllowAll, Authorizer, Role, RoleTable};
pub use digest::Digest;
pub use error::{GuardError, GuardResult};
pub use event::{EventSink, GuardEvent, MemorySink, TracingSink};
pub use ids::{AccountId, SourceId, TxId};
pub use risk::{EnforcementAction, PatternType, RiskLevel, Severity};
