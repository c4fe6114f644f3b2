//! Returns and replacements domain module (event-sourced).
//!
//! Owns the return-request aggregate: its lifecycle state machine, the
//! append-only status timeline shown to customers, and the kind-specific
//! split between refunds and replacement dispatches.

pub mod request;

pub use request::{
    AdvanceStatus, OpenReturn, ProductSnapshot, ReplacementOptions, Return, ReturnCommand,
    ReturnEvent, ReturnId, ReturnKind, ReturnOpened, ReturnStatus, ReturnStatusAdvanced,
    TimelineEntry,
};
