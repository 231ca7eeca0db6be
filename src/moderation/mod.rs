//! Punishment lifecycle
//!
//! Records, the ledger that issues and lifts them, strike escalation and the
//! reconciler that keeps the chat platform in line with the store.

pub mod error;
pub mod ledger;
pub mod reconcile;
pub mod record;
pub mod strikes;

pub use error::{ModerationError, ModerationResult, ensure_min_len};
pub use ledger::{Ledger, LiftOutcome, MISUSE_REASON, WarnOutcome};
pub use reconcile::{ReconcileReport, ReconcileRequest, Reconciler, SweepReport};
pub use record::{
    BOT_SCOPE, PrivilegeScope, PrivilegeWarn, Punishment, PunishmentKind, SYSTEM_ISSUER,
    THREE_STRIKES_REASON, Warn, describe_until,
};
pub use strikes::{STRIKE_THRESHOLD, StrikeOutcome, escalate_at_threshold};
