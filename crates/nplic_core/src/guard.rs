//! Processor state guard for the re-entrant part of a dispatch.
//!
//! A dispatcher activation runs with the hart's global interrupt enable
//! cleared (trap entry clears it). Before it re-enables interrupts it must
//! capture the trap return state, because a nested trap overwrites `mepc` and
//! `mstatus.MPP`/`MPIE`. The tokens in this module make that ordering part of
//! the types:
//!
//! * [`Masked`] witnesses that global interrupts are off,
//! * [`PreemptionWindow`] exists only while they are on,
//! * [`ContextSnapshot::apply`] needs a [`Masked`], so restoration cannot run
//!   while a nested trap could still clobber the registers it writes.

use core::fmt;

/// RISC-V privilege level as encoded in `mstatus.MPP`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Privilege {
    User = 0,
    Supervisor = 1,
    Machine = 3,
}

impl Privilege {
    /// Decodes the two-bit `MPP` field. Encoding 2 is reserved.
    pub const fn from_bits(bits: usize) -> Option<Self> {
        match bits & 0b11 {
            0 => Some(Privilege::User),
            1 => Some(Privilege::Supervisor),
            3 => Some(Privilege::Machine),
            _ => None,
        }
    }

    pub const fn bits(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Privilege::User => "U",
            Privilege::Supervisor => "S",
            Privilege::Machine => "M",
        };
        f.write_str(name)
    }
}

/// Register-level view of the hart state a dispatch touches.
///
/// Maps onto `mstatus.MIE`, `mepc`, `mstatus.MPP` and `mstatus.MPIE` of a
/// machine-mode trap. Implementations take `&self` because nested
/// activations share the same hart.
pub trait Hart {
    /// Sets or clears the global interrupt enable (`mstatus.MIE`).
    ///
    /// Setting it may synchronously take a pending trap before returning.
    fn set_global_enable(&self, enabled: bool);

    /// Reads the trap return address (`mepc`).
    fn return_address(&self) -> usize;

    /// Writes the trap return address (`mepc`).
    fn set_return_address(&self, address: usize);

    /// Reads the privilege `mret` will return to (`mstatus.MPP`).
    fn previous_privilege(&self) -> Privilege;

    /// Writes the privilege `mret` will return to (`mstatus.MPP`).
    fn set_previous_privilege(&self, privilege: Privilege);

    /// Reads the interrupt enable `mret` will restore (`mstatus.MPIE`).
    fn previous_enable(&self) -> bool;

    /// Writes the interrupt enable `mret` will restore (`mstatus.MPIE`).
    fn set_previous_enable(&self, enabled: bool);
}

impl<H: Hart + ?Sized> Hart for &H {
    #[inline(always)]
    fn set_global_enable(&self, enabled: bool) {
        (**self).set_global_enable(enabled)
    }

    #[inline(always)]
    fn return_address(&self) -> usize {
        (**self).return_address()
    }

    #[inline(always)]
    fn set_return_address(&self, address: usize) {
        (**self).set_return_address(address)
    }

    #[inline(always)]
    fn previous_privilege(&self) -> Privilege {
        (**self).previous_privilege()
    }

    #[inline(always)]
    fn set_previous_privilege(&self, privilege: Privilege) {
        (**self).set_previous_privilege(privilege)
    }

    #[inline(always)]
    fn previous_enable(&self) -> bool {
        (**self).previous_enable()
    }

    #[inline(always)]
    fn set_previous_enable(&self, enabled: bool) {
        (**self).set_previous_enable(enabled)
    }
}

/// Trap return state captured at the start of an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedState {
    pub return_address: usize,
    pub previous_privilege: Privilege,
    pub previous_enable: bool,
}

/// Witness that the hart's global interrupt enable is clear.
pub struct Masked<'h, H: Hart> {
    hart: &'h H,
}

impl<'h, H: Hart> Masked<'h, H> {
    /// Clears the global enable and returns the witness.
    ///
    /// On trap entry the hardware has already cleared it; the write is then
    /// a no-op.
    pub fn enter(hart: &'h H) -> Self {
        hart.set_global_enable(false);
        Self { hart }
    }

    /// Re-enables global interrupts, allowing nested traps.
    ///
    /// Only sources above the current controller threshold can be taken, so
    /// the threshold must be elevated before calling this.
    pub fn open_window(self) -> PreemptionWindow<'h, H> {
        self.hart.set_global_enable(true);
        PreemptionWindow { hart: self.hart }
    }

    /// The masked hart, for register access before the window opens.
    pub fn hart(&self) -> &'h H {
        self.hart
    }
}

/// Scoped capability during which nested traps may run.
///
/// Global interrupts stay enabled for the lifetime of the token and are
/// cleared again when it is closed or dropped.
pub struct PreemptionWindow<'h, H: Hart> {
    hart: &'h H,
}

impl<'h, H: Hart> PreemptionWindow<'h, H> {
    /// Clears the global enable and hands back the masked witness.
    pub fn close(self) -> Masked<'h, H> {
        let hart = self.hart;
        drop(self);
        Masked { hart }
    }
}

impl<'h, H: Hart> Drop for PreemptionWindow<'h, H> {
    fn drop(&mut self) {
        self.hart.set_global_enable(false);
    }
}

/// Opaque snapshot of the trap return state of one activation.
///
/// Applying it restores `mepc`, `MPIE` and `MPP` exactly as captured and then
/// re-asserts the privilege the interrupted code runs in. A nested `mret`
/// leaves `MPP` at the least-privileged mode; resuming with only `mepc`
/// restored drops the hart into that mode on the outer `mret`, which faults
/// as soon as it touches machine-only state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextSnapshot {
    saved: SavedState,
    resume: Privilege,
}

impl ContextSnapshot {
    /// Captures the trap return state. Requires interrupts to be masked.
    pub fn capture<H: Hart>(masked: &Masked<'_, H>, resume: Privilege) -> Self {
        let hart = masked.hart;
        Self {
            saved: SavedState {
                return_address: hart.return_address(),
                previous_privilege: hart.previous_privilege(),
                previous_enable: hart.previous_enable(),
            },
            resume,
        }
    }

    /// Writes the captured state back and re-asserts the resume privilege.
    pub fn apply<H: Hart>(self, masked: &Masked<'_, H>) {
        let hart = masked.hart;
        hart.set_return_address(self.saved.return_address);
        hart.set_previous_enable(self.saved.previous_enable);
        hart.set_previous_privilege(self.saved.previous_privilege);
        hart.set_previous_privilege(self.resume);
    }

    pub fn saved(&self) -> &SavedState {
        &self.saved
    }

    pub fn resume_privilege(&self) -> Privilege {
        self.resume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::{Cell, RefCell};

    struct RecordingHart {
        mie: Cell<bool>,
        mepc: Cell<usize>,
        mpp: Cell<Privilege>,
        mpie: Cell<bool>,
        writes: RefCell<Vec<&'static str>>,
    }

    impl RecordingHart {
        fn new() -> Self {
            Self {
                mie: Cell::new(false),
                mepc: Cell::new(0x2001_0040),
                mpp: Cell::new(Privilege::Machine),
                mpie: Cell::new(true),
                writes: RefCell::new(Vec::new()),
            }
        }
    }

    impl Hart for RecordingHart {
        fn set_global_enable(&self, enabled: bool) {
            self.writes.borrow_mut().push(if enabled { "mie=1" } else { "mie=0" });
            self.mie.set(enabled);
        }
        fn return_address(&self) -> usize {
            self.mepc.get()
        }
        fn set_return_address(&self, address: usize) {
            assert!(!self.mie.get(), "mepc written with interrupts enabled");
            self.writes.borrow_mut().push("mepc");
            self.mepc.set(address);
        }
        fn previous_privilege(&self) -> Privilege {
            self.mpp.get()
        }
        fn set_previous_privilege(&self, privilege: Privilege) {
            assert!(!self.mie.get(), "mpp written with interrupts enabled");
            self.writes.borrow_mut().push("mpp");
            self.mpp.set(privilege);
        }
        fn previous_enable(&self) -> bool {
            self.mpie.get()
        }
        fn set_previous_enable(&self, enabled: bool) {
            self.writes.borrow_mut().push("mpie");
            self.mpie.set(enabled);
        }
    }

    #[test]
    fn privilege_round_trips_through_mpp_bits() {
        for p in [Privilege::User, Privilege::Supervisor, Privilege::Machine] {
            assert_eq!(Privilege::from_bits(p.bits()), Some(p));
        }
        assert_eq!(Privilege::from_bits(2), None);
    }

    #[test]
    fn window_enables_and_close_disables() {
        let hart = RecordingHart::new();
        let masked = Masked::enter(&hart);
        let window = masked.open_window();
        assert!(hart.mie.get());
        let _masked = window.close();
        assert!(!hart.mie.get());
        assert_eq!(*hart.writes.borrow(), ["mie=0", "mie=1", "mie=0"]);
    }

    #[test]
    fn dropping_window_masks_interrupts() {
        let hart = RecordingHart::new();
        {
            let _window = Masked::enter(&hart).open_window();
            assert!(hart.mie.get());
        }
        assert!(!hart.mie.get());
    }

    #[test]
    fn apply_undoes_nested_clobbering() {
        let hart = RecordingHart::new();
        let masked = Masked::enter(&hart);
        let snapshot = ContextSnapshot::capture(&masked, Privilege::Machine);
        let window = masked.open_window();

        // What a nested trap and its mret leave behind.
        hart.mie.set(false);
        hart.mepc.set(0x2001_0800);
        hart.mpp.set(Privilege::User);
        hart.mie.set(true);

        let masked = window.close();
        snapshot.apply(&masked);
        assert_eq!(hart.mepc.get(), 0x2001_0040);
        assert_eq!(hart.mpp.get(), Privilege::Machine);
        assert!(hart.mpie.get());
    }

    #[test]
    fn resume_privilege_wins_over_captured_value() {
        let hart = RecordingHart::new();
        hart.mpp.set(Privilege::User);
        let masked = Masked::enter(&hart);
        let snapshot = ContextSnapshot::capture(&masked, Privilege::Machine);
        assert_eq!(snapshot.saved().previous_privilege, Privilege::User);
        snapshot.apply(&masked);
        assert_eq!(hart.mpp.get(), Privilege::Machine);
    }
}
