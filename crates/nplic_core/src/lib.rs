//! Nested interrupt dispatch for a RISC-V hart behind a PLIC.
//!
//! This crate provides the dispatch protocol that lets a strictly
//! higher-priority PLIC source preempt the handler of a lower-priority one,
//! together with the controller and hart contracts it is written against.
//! Everything here is `no_std` and is shared by the firmware and by the
//! host-side model that exercises the same code on a workstation.

#![cfg_attr(not(test), no_std)]

/// Interrupt controller contract consumed by the dispatcher.
///
/// Describes the claim/complete, priority, threshold and line-enable
/// operations of a PLIC-style controller. Any controller with a single
/// aggregated request line per hart can implement it.
pub mod controller;

/// Cycle accounting for interrupt versus foreground execution.
///
/// Classifies deltas between consecutive cycle counter samples taken in a
/// tight loop: long gaps are attributed to interrupt handling, short ones to
/// the loop itself.
pub mod cycles;

/// The nested dispatcher.
///
/// Orchestrates claim, threshold elevation, state capture, the preemption
/// window, handler invocation, restoration and completion, and keeps the
/// diagnostic nesting depth.
pub mod dispatcher;

/// Processor state guard.
///
/// Hart register shim plus the scoped tokens that order interrupt masking,
/// the preemption window and context restoration at the type level.
pub mod guard;

/// Host-side model of the PLIC and hart.
///
/// Reproduces trap entry, `mret` and gateway behavior closely enough to run
/// the dispatcher unchanged, records an event trace and audits it.
pub mod sim;

/// Fixed-capacity vector used where no allocator is available.
pub mod static_vec;

/// Source handler table.
///
/// Maps controller source ids to a handler function and its context.
pub mod table;

pub use controller::{Controller, Priority, SourceId};
pub use dispatcher::{NestedDispatcher, Outcome, TrapVector};
pub use guard::{ContextSnapshot, Hart, Masked, PreemptionWindow, Privilege, SavedState};
pub use table::{Handler, HandlerEntry, HandlerTable};

/// Errors returned by setup-time operations.
///
/// The dispatch path itself never fails; these only surface while handlers
/// are being registered or a model is being scripted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlicError {
    /// Source id 0 is reserved by the controller to mean "nothing pending".
    ReservedSource,

    /// The source id does not fit the table or controller.
    SourceOutOfRange(SourceId),

    /// A fixed-capacity buffer has no room for another entry.
    TableFull,
}

impl core::fmt::Display for PlicError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PlicError::ReservedSource => write!(f, "source 0 is reserved"),
            PlicError::SourceOutOfRange(id) => write!(f, "source {} is out of range", id),
            PlicError::TableFull => write!(f, "table is full"),
        }
    }
}

impl core::error::Error for PlicError {}
