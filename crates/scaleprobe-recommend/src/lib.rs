//! scaleprobe-recommend — capacity recommendations by experiment.
//!
//! Runs controlled trials against a live placement engine (through the
//! [`ClusterStore`](scaleprobe_state::ClusterStore) capability) and
//! recommends which capacity to add or remove.
//!
//! # Scale-up
//!
//! ```text
//! while workload is unplaced and round < max_rounds:
//!     eligible = pools below maximum              (none → CapacityExhausted)
//!     for each eligible pool, concurrently:
//!         clone a template unit as a tainted trial unit
//!         submit copies of the unplaced workload pinned to it
//!     wait for the round to settle
//!     score each trial: waste + unscheduled + cost
//!     commit the lowest score as a permanent unit  (none → NoWinner)
//!     purge every trial unit and copy of the round
//!     wait for placement to react to the new unit
//! ```
//!
//! # Scale-down
//!
//! Units are tested one by one from most to least expensive. Each is
//! cordoned and its workload re-submitted as fresh copies; the unit is
//! removable only if every copy lands elsewhere. Pre-existing units are
//! never candidates.

pub mod context;
pub mod convergence;
pub mod engine;
pub mod error;
pub mod pools;
pub mod scale_down;
pub mod scale_up;
pub mod scorer;
pub mod trial;

pub use context::RunContext;
pub use convergence::{ConvergenceWaiter, WorkloadScope};
pub use engine::Recommender;
pub use error::{RecommendError, RecommendResult, StopCause};
pub use pools::PoolEnumerator;
pub use scale_down::ScaleDownRecommender;
pub use scale_up::{Recommendation, ScaleUpOutcome, ScaleUpRecommender};
pub use scorer::{OutcomeScorer, ScoreWeights, TrialOutcome, select_winner};
