//! Machine-mode CSR access for the dispatcher.
//!
//! Maps the [`Hart`] operations onto `mstatus`, `mepc` and `mie` of the
//! running hart through the `riscv` crate. `MPIE` has no clear helper there,
//! so it is written with `csrs`/`csrc` directly.

use core::arch::asm;

use nplic_common::csr::MSTATUS_MPIE;
use nplic_core::{Hart, Privilege};
use riscv::register::{mepc, mie, mstatus};

/// The hart this firmware runs on.
pub struct MachineHart;

impl Hart for MachineHart {
    #[inline(always)]
    fn set_global_enable(&self, enabled: bool) {
        unsafe {
            if enabled {
                mstatus::set_mie();
            } else {
                mstatus::clear_mie();
            }
        }
    }

    #[inline(always)]
    fn return_address(&self) -> usize {
        mepc::read()
    }

    #[inline(always)]
    fn set_return_address(&self, address: usize) {
        unsafe { mepc::write(address) }
    }

    fn previous_privilege(&self) -> Privilege {
        match mstatus::read().mpp() {
            mstatus::MPP::User => Privilege::User,
            mstatus::MPP::Supervisor => Privilege::Supervisor,
            mstatus::MPP::Machine => Privilege::Machine,
        }
    }

    fn set_previous_privilege(&self, privilege: Privilege) {
        let mpp = match privilege {
            Privilege::User => mstatus::MPP::User,
            Privilege::Supervisor => mstatus::MPP::Supervisor,
            Privilege::Machine => mstatus::MPP::Machine,
        };
        unsafe { mstatus::set_mpp(mpp) }
    }

    #[inline(always)]
    fn previous_enable(&self) -> bool {
        mstatus::read().mpie()
    }

    #[inline(always)]
    fn set_previous_enable(&self, enabled: bool) {
        unsafe {
            if enabled {
                asm!("csrs mstatus, {0}", in(reg) MSTATUS_MPIE);
            } else {
                asm!("csrc mstatus, {0}", in(reg) MSTATUS_MPIE);
            }
        }
    }
}

/// Whether machine interrupts are currently enabled.
#[inline(always)]
pub fn interrupts_enabled() -> bool {
    mstatus::read().mie()
}

/// Unmasks machine external interrupts at the hart and globally.
///
/// # Safety
///
/// The dispatcher must be installed; the first PLIC request traps
/// immediately.
pub unsafe fn enable_external_interrupts() {
    unsafe {
        mie::set_mext();
        mstatus::set_mie();
    }
}

/// Sleeps forever.
pub fn halt() -> ! {
    loop {
        unsafe { riscv::asm::wfi() }
    }
}
