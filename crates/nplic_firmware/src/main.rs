#![no_std]
#![no_main]

use core::arch::global_asm;
use core::cell::UnsafeCell;
use core::fmt;

use nplic_common::csr::MSTATUS_MIE;
use nplic_common::mmio::{PLIC_BASE, PWM1_BASE, PWM2_BASE};
use nplic_common::plic::{PWM1_SOURCE, PWM2_SOURCE, SOURCE_COUNT};
use nplic_core::{NestedDispatcher, PlicError, SourceId};

#[cfg(feature = "cycle_bench")]
mod bench;
mod console;
mod drivers;
mod hart;
mod trap;

use drivers::plic::Plic;
use drivers::pwm::{Pwm, PwmError};
use hart::MachineHart;

#[cfg(feature = "quiet_panic")]
use panic_halt as _;

global_asm!(include_str!("entry.S"), mstatus_mie = const MSTATUS_MIE);

/// PWM1 comparator 0: low priority, slow.
const PWM1_PRIORITY: u32 = 2;
const PWM1_HZ: u32 = 5;

/// PWM2 comparator 0: high priority, fast enough to land inside PWM1's
/// handler regularly.
const PWM2_PRIORITY: u32 = 5;
const PWM2_HZ: u32 = 53;

type Dispatcher = NestedDispatcher<&'static Plic, &'static MachineHart, &'static Pwm, SOURCE_COUNT>;

struct GlobalCell<T>(UnsafeCell<T>);
unsafe impl<T> Sync for GlobalCell<T> {}

impl<T> GlobalCell<T> {
    const fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }

    #[allow(clippy::mut_from_ref)]
    unsafe fn get_mut(&self) -> &mut T {
        unsafe { &mut *self.0.get() }
    }

    unsafe fn get(&self) -> &T {
        unsafe { &*self.0.get() }
    }
}

static PLIC: Plic = Plic::new(PLIC_BASE);
static HART: MachineHart = MachineHart;
static PWM1: Pwm = Pwm::new(PWM1_BASE, PWM1_SOURCE, 16);
static PWM2: Pwm = Pwm::new(PWM2_BASE, PWM2_SOURCE, 16);

// Written once in `kmain` before external interrupts are unmasked, read-only
// from the trap path afterwards.
static DISPATCHER: GlobalCell<Option<Dispatcher>> = GlobalCell::new(None);

/// The installed dispatcher, if setup has completed.
pub(crate) fn dispatcher() -> Option<&'static Dispatcher> {
    unsafe { DISPATCHER.get().as_ref() }
}

#[derive(Debug)]
enum SetupError {
    Plic(PlicError),
    Pwm(PwmError),
}

impl From<PlicError> for SetupError {
    fn from(e: PlicError) -> Self {
        SetupError::Plic(e)
    }
}

impl From<PwmError> for SetupError {
    fn from(e: PwmError) -> Self {
        SetupError::Pwm(e)
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::Plic(e) => write!(f, "PLIC: {}", e),
            SetupError::Pwm(e) => write!(f, "PWM: {}", e),
        }
    }
}

/// Handler for comparator 0 of either PWM.
fn pwm_isr(_source: SourceId, pwm: &'static Pwm) {
    pwm.clear_interrupt(0);
}

/// Prints `<source> <depth>` for every claim.
#[cfg(not(feature = "cycle_bench"))]
fn trace_claim(source: SourceId, depth: usize) {
    console::println!("{} {}", source, depth);
}

fn setup() -> Result<(), SetupError> {
    PLIC.reset();

    #[cfg(not(feature = "cycle_bench"))]
    let mut dispatcher: Dispatcher = NestedDispatcher::new(&PLIC, &HART).with_tracer(trace_claim);
    #[cfg(feature = "cycle_bench")]
    let mut dispatcher: Dispatcher = NestedDispatcher::new(&PLIC, &HART);

    #[cfg(not(feature = "cycle_bench"))]
    let pwm1_hz = PWM1_HZ;
    #[cfg(feature = "cycle_bench")]
    let pwm1_hz = bench::BENCH_HZ;

    PWM1.configure(pwm1_hz)?;
    dispatcher.install(PWM1.interrupt_source(0), PWM1_PRIORITY, pwm_isr, &PWM1)?;

    #[cfg(not(feature = "cycle_bench"))]
    {
        PWM2.configure(PWM2_HZ)?;
        dispatcher.install(PWM2.interrupt_source(0), PWM2_PRIORITY, pwm_isr, &PWM2)?;
    }

    unsafe {
        *DISPATCHER.get_mut() = Some(dispatcher);
    }

    PWM1.start();
    #[cfg(not(feature = "cycle_bench"))]
    PWM2.start();

    Ok(())
}

#[unsafe(no_mangle)]
pub extern "C" fn kmain() -> ! {
    console::init();
    console::println!("[BOOT] nested PLIC dispatch");

    if let Err(e) = setup() {
        console::println!("[BOOT] setup failed: {}", e);
        hart::halt();
    }

    unsafe { hart::enable_external_interrupts() };
    console::println!("[BOOT] interrupts enabled");

    #[cfg(feature = "cycle_bench")]
    bench::run();

    hart::halt();
}

#[cfg(not(feature = "quiet_panic"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    console::println!("PANIC: {}", info);
    hart::halt();
}
