/// Interrupt source number assigned by the controller.
///
/// Source 0 is reserved and never names a device; a claim returning 0 means
/// nothing was pending.
pub type SourceId = u32;

/// Source priority or controller threshold.
///
/// A source generates a request to the hart only while its priority is
/// strictly greater than the threshold. Priority 0 never interrupts.
pub type Priority = u32;

/// Operations the dispatcher needs from a platform-level interrupt controller.
///
/// All methods take `&self`: a controller is a register file, and nested
/// dispatcher activations on the same hart access it through shared
/// references in strictly nested order.
pub trait Controller {
    /// Claims the highest-priority pending source.
    ///
    /// Clears the source's pending bit and lowers the aggregated request line
    /// until another eligible source exists. Returns `None` when nothing is
    /// pending.
    fn claim(&self) -> Option<SourceId>;

    /// Signals that servicing of a previously claimed source has finished.
    ///
    /// Must be called exactly once per successful claim, after all nested
    /// work referencing that source. The gateway may then forward a new
    /// request for it.
    fn complete(&self, source: SourceId);

    /// Returns the configured priority of `source`.
    fn priority(&self, source: SourceId) -> Priority;

    /// Programs the priority of `source`. Setup only.
    fn set_priority(&self, source: SourceId, priority: Priority);

    /// Returns the current acceptance threshold.
    fn threshold(&self) -> Priority;

    /// Replaces the acceptance threshold.
    ///
    /// No bounds are enforced beyond the register width; the caller restores
    /// the previous value.
    fn set_threshold(&self, threshold: Priority);

    /// Lets requests from `source` reach the hart.
    fn enable(&self, source: SourceId);

    /// Stops requests from `source` reaching the hart.
    fn disable(&self, source: SourceId);
}

impl<C: Controller + ?Sized> Controller for &C {
    #[inline(always)]
    fn claim(&self) -> Option<SourceId> {
        (**self).claim()
    }

    #[inline(always)]
    fn complete(&self, source: SourceId) {
        (**self).complete(source)
    }

    #[inline(always)]
    fn priority(&self, source: SourceId) -> Priority {
        (**self).priority(source)
    }

    #[inline(always)]
    fn set_priority(&self, source: SourceId, priority: Priority) {
        (**self).set_priority(source, priority)
    }

    #[inline(always)]
    fn threshold(&self) -> Priority {
        (**self).threshold()
    }

    #[inline(always)]
    fn set_threshold(&self, threshold: Priority) {
        (**self).set_threshold(threshold)
    }

    #[inline(always)]
    fn enable(&self, source: SourceId) {
        (**self).enable(source)
    }

    #[inline(always)]
    fn disable(&self, source: SourceId) {
        (**self).disable(source)
    }
}
