//! Complaints against moderators: filing and resolution

pub mod filing;
pub mod record;
pub mod resolution;

pub use filing::{ComplaintDraft, ComplaintFiling, FilingProgress, FilingStep};
pub use record::{Complaint, ComplaintStatus};
pub use resolution::{
    ComplaintResolver, ComplaintStats, Resolution, ResolutionOutcome,
};
