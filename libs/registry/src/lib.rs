//! # Fairway Target Registry
//!
//! Server-side directory of known vessels and the spatial query surface
//! over them. A `Target` is the durable record of one peer (live or not);
//! the `TargetRegistry` is the concurrent keyed store of all of them; the
//! `ProximityIndex` answers "who is near" from a periodically rebuilt
//! snapshot; service discovery is the proximity query restricted to targets
//! that registered a service name.

pub mod proximity;
pub mod registry;
pub mod target;

pub use proximity::{spawn_rebuild_task, NearTarget, ProximityIndex};
pub use registry::TargetRegistry;
pub use target::Target;
