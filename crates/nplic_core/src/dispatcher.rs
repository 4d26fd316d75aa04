//! Nested interrupt dispatcher.
//!
//! Replaces the plain "claim, run handler, complete" sequence with one that
//! lets a strictly higher-priority source preempt a running handler:
//!
//! 1. claim the source and read its priority,
//! 2. raise the controller threshold to that priority,
//! 3. capture the trap return state,
//! 4. re-enable global interrupts and run the handler,
//! 5. mask again, restore the trap state and the old threshold,
//! 6. complete the source.
//!
//! While step 4 runs, the hart can take a new trap and re-enter
//! [`NestedDispatcher::dispatch`] on the same stack. The elevated threshold
//! guarantees that any such inner activation serves a source of strictly
//! higher priority, so nesting depth is bounded by the number of priority
//! levels and completions unwind in LIFO order.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::PlicError;
use crate::controller::{Controller, Priority, SourceId};
use crate::guard::{ContextSnapshot, Hart, Masked, Privilege};
use crate::table::{Handler, HandlerTable};

/// Result of one dispatcher activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The claim returned no source; nothing was touched.
    Spurious,
    /// The source was claimed, its handler ran, and it was completed.
    Serviced(SourceId),
    /// The source was claimed and completed but had no handler registered.
    Unhandled(SourceId),
}

/// Entry point the hart's trap vector calls for external interrupts.
pub trait TrapVector {
    fn trap(&self);
}

/// Diagnostic hook receiving each claimed source and the nesting depth.
pub type Tracer = fn(SourceId, usize);

/// Priority-threshold based nested dispatcher for one hart.
pub struct NestedDispatcher<C, H, T: Copy, const N: usize> {
    controller: C,
    hart: H,
    table: HandlerTable<T, N>,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    resume: Privilege,
    tracer: Option<Tracer>,
}

impl<C: Controller, H: Hart, T: Copy, const N: usize> NestedDispatcher<C, H, T, N> {
    /// Creates a dispatcher with an empty handler table.
    ///
    /// Activations resume the interrupted code in machine mode unless
    /// [`with_resume_privilege`](Self::with_resume_privilege) says otherwise.
    pub const fn new(controller: C, hart: H) -> Self {
        Self {
            controller,
            hart,
            table: HandlerTable::new(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            resume: Privilege::Machine,
            tracer: None,
        }
    }

    /// Installs a hook called after every successful claim.
    ///
    /// # Arguments
    ///
    /// * `tracer` - Receives the claimed source and the nesting depth
    ///   including the new activation. Runs with interrupts masked.
    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Sets the privilege every activation returns to.
    ///
    /// # Arguments
    ///
    /// * `privilege` - Written to `MPP` after the snapshot is restored.
    ///   Defaults to [`Privilege::Machine`]; a user-mode foreground needs
    ///   [`Privilege::User`].
    pub fn with_resume_privilege(mut self, privilege: Privilege) -> Self {
        self.resume = privilege;
        self
    }

    /// Registers a handler, programs the priority, then enables the line.
    ///
    /// The line is only enabled once the handler is in place, so a source
    /// asserted early never reaches an empty slot through this path.
    pub fn install(
        &mut self,
        source: SourceId,
        priority: Priority,
        handler: Handler<T>,
        context: T,
    ) -> Result<(), PlicError> {
        self.table.register(source, handler, context)?;
        self.controller.set_priority(source, priority);
        self.controller.enable(source);
        Ok(())
    }

    /// Services one external interrupt.
    ///
    /// Called from the trap vector with global interrupts masked, and
    /// recursively from inside the preemption window of an outer activation.
    pub fn dispatch(&self) -> Outcome {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);

        let outcome = match self.controller.claim() {
            Some(source) => self.service(source, depth),
            None => Outcome::Spurious,
        };

        self.depth.fetch_sub(1, Ordering::Relaxed);
        outcome
    }

    fn service(&self, source: SourceId, depth: usize) -> Outcome {
        if let Some(trace) = self.tracer {
            trace(source, depth);
        }

        let priority = self.controller.priority(source);
        let saved_threshold = self.controller.threshold();
        self.controller.set_threshold(priority);

        let masked = Masked::enter(&self.hart);
        let snapshot = ContextSnapshot::capture(&masked, self.resume);

        let window = masked.open_window();
        let handled = match self.table.lookup(source) {
            Some(entry) => {
                entry.invoke(source);
                true
            }
            None => false,
        };
        let masked = window.close();

        snapshot.apply(&masked);
        self.controller.set_threshold(saved_threshold);
        self.controller.complete(source);

        if handled {
            Outcome::Serviced(source)
        } else {
            Outcome::Unhandled(source)
        }
    }

    /// Number of activations currently on the stack.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Deepest nesting observed since creation.
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    /// The controller adapter the dispatcher claims from.
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// The hart whose state is saved around each handler.
    pub fn hart(&self) -> &H {
        &self.hart
    }

    /// Registered handlers.
    pub fn table(&self) -> &HandlerTable<T, N> {
        &self.table
    }

    /// Mutable access to the handlers for registration without touching
    /// controller priority or enable state.
    ///
    /// # Returns
    ///
    /// The table; only reachable before the dispatcher is shared with the
    /// trap path.
    pub fn table_mut(&mut self) -> &mut HandlerTable<T, N> {
        &mut self.table
    }
}

impl<C: Controller, H: Hart, T: Copy, const N: usize> TrapVector for NestedDispatcher<C, H, T, N> {
    fn trap(&self) {
        self.dispatch();
    }
}
