//! Source-indexed handler storage.
//!
//! A dense array of optional entries, one per controller source. Filled
//! during setup and only read from the trap path once interrupts are live.

use crate::PlicError;
use crate::controller::SourceId;

/// Per-source interrupt handler.
///
/// Receives the claimed source id and the context registered with it.
pub type Handler<T> = fn(SourceId, T);

/// A registered handler and the context it is invoked with.
#[derive(Clone, Copy)]
pub struct HandlerEntry<T: Copy> {
    /// Function invoked for the source.
    pub handler: Handler<T>,
    /// Value passed to `handler` on every call.
    pub context: T,
}

impl<T: Copy> HandlerEntry<T> {
    #[inline(always)]
    pub fn invoke(&self, source: SourceId) {
        (self.handler)(source, self.context)
    }
}

/// Dense table from source id to handler, sized to the controller.
///
/// Populated during setup, before the corresponding lines are enabled, and
/// only read once interrupts are live.
pub struct HandlerTable<T: Copy, const N: usize> {
    entries: [Option<HandlerEntry<T>>; N],
}

impl<T: Copy, const N: usize> Default for HandlerTable<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy, const N: usize> HandlerTable<T, N> {
    pub const fn new() -> Self {
        Self { entries: [None; N] }
    }

    /// Registers `handler` for `source`, replacing any previous entry.
    pub fn register(
        &mut self,
        source: SourceId,
        handler: Handler<T>,
        context: T,
    ) -> Result<(), PlicError> {
        let slot = self.slot(source)?;
        self.entries[slot] = Some(HandlerEntry { handler, context });
        Ok(())
    }

    /// Resolves `source`; unregistered or out-of-range ids yield `None`.
    #[inline(always)]
    pub fn lookup(&self, source: SourceId) -> Option<HandlerEntry<T>> {
        self.entries.get(source as usize).copied().flatten()
    }

    pub fn is_registered(&self, source: SourceId) -> bool {
        self.lookup(source).is_some()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    fn slot(&self, source: SourceId) -> Result<usize, PlicError> {
        match source as usize {
            0 => Err(PlicError::ReservedSource),
            idx if idx < N => Ok(idx),
            _ => Err(PlicError::SourceOutOfRange(source)),
        }
    }
}
