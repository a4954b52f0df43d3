//! Core data model (spec section 3): Workload, Evidence, DetectionState,
//! Coverage, and the hyperparameter/parsed-event value types. Plain data
//! with invariant-checking constructors and transitions; no I/O.

pub mod coverage;
pub mod detection_state;
pub mod evidence;
pub mod hparam;
pub mod workload;
