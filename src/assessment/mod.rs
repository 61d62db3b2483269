//! Assessment flow: rubric-gated writing phases.
//!
//! The user works through an ordered list of phases. Each answer goes to the
//! assistant for feedback; scored phases are then graded against a
//! faculty rubric and the user advances only once the total reaches the
//! phase's minimum (or the phase is skipped, where allowed).

pub mod flow;
pub mod phase;
pub mod routes;
pub mod scoring;
pub mod sessions;
pub mod state;
pub mod view;

pub use flow::{AssessmentFlow, FlowSettings, PhaseStatus, ResubmissionPolicy, SubmitOutcome};
pub use phase::{InputKind, PhaseDefinition, PhasePresentation, ScoringRule};
pub use routes::{AssessmentRouteState, PhaseAnswer, SessionOpened, assessment_routes};
pub use scoring::{build_scoring_instructions, extract_score};
pub use sessions::{SessionRegistry, SharedFlow};
pub use state::{PhaseRecord, SKIPPED_MARKER, SessionState};
pub use view::{PhaseView, TranscriptView};
