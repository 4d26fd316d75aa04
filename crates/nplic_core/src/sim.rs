//! Host-executable model of a PLIC and a single machine-mode hart.
//!
//! The model is faithful where the nested dispatcher depends on hardware
//! behavior:
//!
//! * the hart takes a trap whenever `MIE` is set and the controller's
//!   aggregated line is asserted, including synchronously inside the call
//!   that sets `MIE`,
//! * trap entry saves `MIE` into `MPIE`, the current privilege into `MPP`
//!   and the program counter into `mepc`,
//! * `mret` restores them and leaves `MPP` at user mode, which is what makes
//!   the privilege re-assertion in [`ContextSnapshot`] necessary,
//! * a gateway forwards no new request for a source between its claim and
//!   its completion; a request arriving in between is latched.
//!
//! Every controller and hart transition is appended to an event trace that
//! [`audit`] checks against the dispatch invariants.
//!
//! Wiring a model takes a few locals because the hart must know its trap
//! vector and the dispatcher borrows the hart:
//!
//! ```
//! use nplic_core::sim::{scripted_handler, SimDispatcher, SimHart, SimPlic, Stimulus};
//! use nplic_core::NestedDispatcher;
//!
//! let plic = SimPlic::new();
//! let hart = SimHart::new(&plic);
//! let mut stimulus = Stimulus::new(&hart);
//! stimulus.on(44, 48).unwrap();
//! let mut dispatcher: SimDispatcher<'_> = NestedDispatcher::new(&plic, &hart);
//! dispatcher.install(44, 2, scripted_handler, &stimulus).unwrap();
//! dispatcher.install(48, 5, scripted_handler, &stimulus).unwrap();
//! hart.install(&dispatcher);
//! hart.enable_interrupts();
//! hart.raise(44);
//! assert!(plic.audit(0).is_ok());
//! ```
//!
//! [`ContextSnapshot`]: crate::guard::ContextSnapshot

use core::cell::{Cell, RefCell};

use nplic_common::plic::{PRIORITY_MASK, SOURCE_COUNT};

use crate::PlicError;
use crate::controller::{Controller, Priority, SourceId};
use crate::dispatcher::{NestedDispatcher, TrapVector};
use crate::guard::{Hart, Privilege};
use crate::static_vec::StaticVec;

/// Events kept per model before the trace reports overflow.
pub const TRACE_CAPACITY: usize = 512;

/// Scripted reactions a [`Stimulus`] can hold.
pub const REACTION_CAPACITY: usize = 32;

/// Program counter of the interrupted foreground loop.
pub const MAIN_PC: usize = 0x2001_0000;

/// Program counter the hart jumps to on trap entry.
pub const TRAP_VECTOR_PC: usize = 0x2001_0400;

/// Deepest nesting [`audit`] tracks.
const AUDIT_DEPTH: usize = 64;

/// One observable transition of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A device asserted its interrupt line.
    Raise(SourceId),
    /// The hart entered the trap vector from `pc`.
    Trap { pc: usize },
    /// The controller handed out a source.
    Claim { source: SourceId, priority: Priority },
    /// A claim found nothing pending.
    Spurious,
    /// The threshold register was written.
    SetThreshold(Priority),
    /// A scripted handler ran.
    Handler(SourceId),
    /// A source was completed.
    Complete(SourceId),
    /// `mret` resumed at `pc` in `privilege`.
    Return { pc: usize, privilege: Privilege },
}

#[derive(Debug, Clone, Copy, Default)]
struct Gateway {
    priority: Priority,
    enabled: bool,
    pending: bool,
    in_flight: bool,
    latched: bool,
}

/// Model of the controller: per-source gateways, threshold and trace.
pub struct SimPlic {
    gateways: [Cell<Gateway>; SOURCE_COUNT],
    threshold: Cell<Priority>,
    trace: RefCell<StaticVec<Event, TRACE_CAPACITY>>,
    overflowed: Cell<bool>,
}

impl Default for SimPlic {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPlic {
    /// Creates a controller with every source disabled at priority 0,
    /// threshold 0 and an empty trace.
    pub fn new() -> Self {
        Self {
            gateways: core::array::from_fn(|_| Cell::new(Gateway::default())),
            threshold: Cell::new(0),
            trace: RefCell::new(StaticVec::new()),
            overflowed: Cell::new(false),
        }
    }

    fn gateway(&self, source: SourceId) -> Option<&Cell<Gateway>> {
        match source {
            0 => None,
            s => self.gateways.get(s as usize),
        }
    }

    /// Asserts the interrupt request of `source`.
    ///
    /// Requests for unknown sources are dropped. While the source is in
    /// flight the request is latched until completion.
    pub fn raise(&self, source: SourceId) {
        let Some(cell) = self.gateway(source) else {
            return;
        };
        self.record(Event::Raise(source));
        let mut gw = cell.get();
        if gw.in_flight {
            gw.latched = true;
        } else {
            gw.pending = true;
        }
        cell.set(gw);
    }

    /// Aggregated request line towards the hart.
    pub fn eligible(&self) -> bool {
        let threshold = self.threshold.get();
        self.gateways.iter().skip(1).any(|cell| {
            let gw = cell.get();
            gw.pending && gw.enabled && gw.priority > threshold
        })
    }

    /// Whether `source` has a request waiting to be claimed.
    pub fn is_pending(&self, source: SourceId) -> bool {
        self.gateway(source).is_some_and(|c| c.get().pending)
    }

    /// Whether `source` is claimed and not yet completed.
    pub fn is_in_flight(&self, source: SourceId) -> bool {
        self.gateway(source).is_some_and(|c| c.get().in_flight)
    }

    /// Whether `source` is enabled for the hart.
    pub fn is_enabled(&self, source: SourceId) -> bool {
        self.gateway(source).is_some_and(|c| c.get().enabled)
    }

    /// Appends an event to the trace.
    pub fn record(&self, event: Event) {
        if self.trace.borrow_mut().push(event).is_err() {
            self.overflowed.set(true);
        }
    }

    /// Runs `f` over the recorded events.
    ///
    /// Must not be called from inside a handler.
    pub fn with_trace<R>(&self, f: impl FnOnce(&[Event]) -> R) -> R {
        f(&self.trace.borrow())
    }

    /// Whether events were dropped because the trace was full.
    pub fn overflowed(&self) -> bool {
        self.overflowed.get()
    }

    /// Drops all recorded events and the overflow flag.
    pub fn clear_trace(&self) {
        self.trace.borrow_mut().clear();
        self.overflowed.set(false);
    }

    /// Audits the recorded trace; see [`audit`].
    pub fn audit(&self, initial_threshold: Priority) -> Result<TraceSummary, Violation> {
        if self.overflowed() {
            return Err(Violation::TraceOverflow);
        }
        self.with_trace(|events| audit(events, initial_threshold))
    }
}

impl Controller for SimPlic {
    fn claim(&self) -> Option<SourceId> {
        let mut best: Option<(SourceId, Priority)> = None;
        for (id, cell) in self.gateways.iter().enumerate().skip(1) {
            let gw = cell.get();
            if !(gw.pending && gw.enabled) || gw.priority == 0 {
                continue;
            }
            match best {
                // Ties go to the lowest id.
                Some((_, p)) if p >= gw.priority => {}
                _ => best = Some((id as SourceId, gw.priority)),
            }
        }

        match best {
            Some((source, priority)) => {
                let cell = &self.gateways[source as usize];
                let mut gw = cell.get();
                gw.pending = false;
                gw.in_flight = true;
                cell.set(gw);
                self.record(Event::Claim { source, priority });
                Some(source)
            }
            None => {
                self.record(Event::Spurious);
                None
            }
        }
    }

    fn complete(&self, source: SourceId) {
        self.record(Event::Complete(source));
        if let Some(cell) = self.gateway(source) {
            let mut gw = cell.get();
            if gw.in_flight {
                gw.in_flight = false;
                if gw.latched {
                    gw.latched = false;
                    gw.pending = true;
                }
            }
            cell.set(gw);
        }
    }

    fn priority(&self, source: SourceId) -> Priority {
        self.gateway(source).map_or(0, |c| c.get().priority)
    }

    fn set_priority(&self, source: SourceId, priority: Priority) {
        if let Some(cell) = self.gateway(source) {
            let mut gw = cell.get();
            gw.priority = priority & PRIORITY_MASK;
            cell.set(gw);
        }
    }

    fn threshold(&self) -> Priority {
        self.threshold.get()
    }

    fn set_threshold(&self, threshold: Priority) {
        let threshold = threshold & PRIORITY_MASK;
        self.record(Event::SetThreshold(threshold));
        self.threshold.set(threshold);
    }

    fn enable(&self, source: SourceId) {
        if let Some(cell) = self.gateway(source) {
            let mut gw = cell.get();
            gw.enabled = true;
            cell.set(gw);
        }
    }

    fn disable(&self, source: SourceId) {
        if let Some(cell) = self.gateway(source) {
            let mut gw = cell.get();
            gw.enabled = false;
            cell.set(gw);
        }
    }
}

/// Model of a machine-mode hart with user mode support.
pub struct SimHart<'a> {
    plic: &'a SimPlic,
    vector: Cell<Option<&'a dyn TrapVector>>,
    mie: Cell<bool>,
    mpie: Cell<bool>,
    mpp: Cell<Privilege>,
    privilege: Cell<Privilege>,
    mepc: Cell<usize>,
    pc: Cell<usize>,
}

impl<'a> SimHart<'a> {
    /// A hart running the foreground loop in machine mode, interrupts off.
    pub fn new(plic: &'a SimPlic) -> Self {
        Self {
            plic,
            vector: Cell::new(None),
            mie: Cell::new(false),
            mpie: Cell::new(false),
            mpp: Cell::new(Privilege::Machine),
            privilege: Cell::new(Privilege::Machine),
            mepc: Cell::new(0),
            pc: Cell::new(MAIN_PC),
        }
    }

    /// Points the trap vector at `vector`.
    pub fn install(&self, vector: &'a dyn TrapVector) {
        self.vector.set(Some(vector));
    }

    /// Foreground enabling of machine interrupts.
    pub fn enable_interrupts(&self) {
        self.set_global_enable(true);
    }

    /// Asserts `source` and lets the hart react to it.
    pub fn raise(&self, source: SourceId) {
        self.plic.raise(source);
        self.poll();
    }

    /// Takes traps while interrupts are enabled and the line is asserted.
    pub fn poll(&self) {
        while self.mie.get() && self.plic.eligible() {
            match self.vector.get() {
                Some(vector) => self.take_trap(vector),
                None => break,
            }
        }
    }

    fn take_trap(&self, vector: &dyn TrapVector) {
        let pc = self.pc.get();
        self.plic.record(Event::Trap { pc });
        self.mpie.set(self.mie.get());
        self.mie.set(false);
        self.mpp.set(self.privilege.get());
        self.privilege.set(Privilege::Machine);
        self.mepc.set(pc);
        self.pc.set(TRAP_VECTOR_PC);

        vector.trap();

        self.mret();
    }

    fn mret(&self) {
        let pc = self.mepc.get();
        let privilege = self.mpp.get();
        self.pc.set(pc);
        self.privilege.set(privilege);
        self.mie.set(self.mpie.get());
        self.mpie.set(true);
        self.mpp.set(Privilege::User);
        self.plic.record(Event::Return { pc, privilege });
    }

    pub fn plic(&self) -> &'a SimPlic {
        self.plic
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege.get()
    }

    pub fn pc(&self) -> usize {
        self.pc.get()
    }

    pub fn global_enable(&self) -> bool {
        self.mie.get()
    }
}

impl Hart for SimHart<'_> {
    fn set_global_enable(&self, enabled: bool) {
        self.mie.set(enabled);
        if enabled {
            self.poll();
        }
    }

    fn return_address(&self) -> usize {
        self.mepc.get()
    }

    fn set_return_address(&self, address: usize) {
        self.mepc.set(address);
    }

    fn previous_privilege(&self) -> Privilege {
        self.mpp.get()
    }

    fn set_previous_privilege(&self, privilege: Privilege) {
        self.mpp.set(privilege);
    }

    fn previous_enable(&self) -> bool {
        self.mpie.get()
    }

    fn set_previous_enable(&self, enabled: bool) {
        self.mpie.set(enabled);
    }
}

#[derive(Debug, Clone, Copy)]
struct Reaction {
    trigger: SourceId,
    raise: SourceId,
}

/// Scripted device behavior: "while handling X, raise Y".
///
/// Each reaction fires once, so scripts that raise each other cannot loop.
pub struct Stimulus<'a> {
    hart: &'a SimHart<'a>,
    reactions: StaticVec<Reaction, REACTION_CAPACITY>,
    fired: [Cell<bool>; REACTION_CAPACITY],
}

impl<'a> Stimulus<'a> {
    pub fn new(hart: &'a SimHart<'a>) -> Self {
        Self {
            hart,
            reactions: StaticVec::new(),
            fired: core::array::from_fn(|_| Cell::new(false)),
        }
    }

    /// Adds a reaction raising `raise` when the handler of `trigger` runs.
    pub fn on(&mut self, trigger: SourceId, raise: SourceId) -> Result<(), PlicError> {
        self.reactions
            .push(Reaction { trigger, raise })
            .map_err(|_| PlicError::TableFull)
    }

    /// Fires the pending reactions of `source`, in insertion order.
    pub fn react(&self, source: SourceId) {
        for (reaction, fired) in self.reactions.iter().zip(self.fired.iter()) {
            if reaction.trigger == source && !fired.get() {
                fired.set(true);
                self.hart.raise(reaction.raise);
            }
        }
    }

    pub fn hart(&self) -> &'a SimHart<'a> {
        self.hart
    }
}

/// Handler used for every simulated device.
pub fn scripted_handler(source: SourceId, stimulus: &Stimulus<'_>) {
    stimulus.hart().plic().record(Event::Handler(source));
    stimulus.react(source);
}

/// Dispatcher type wired to the model.
pub type SimDispatcher<'a> =
    NestedDispatcher<&'a SimPlic, &'a SimHart<'a>, &'a Stimulus<'a>, SOURCE_COUNT>;

/// Counters derived from a trace that passed the audit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceSummary {
    /// Device requests, including latched ones.
    pub raises: usize,
    /// Trap entries taken by the hart.
    pub traps: usize,
    /// Claims that returned a source.
    pub claims: usize,
    /// Claims that found nothing pending.
    pub spurious: usize,
    /// Handler invocations.
    pub handled: usize,
    /// Completions written back to the controller.
    pub completions: usize,
    /// Claims made while another activation was still open.
    pub preemptions: usize,
    /// Deepest nesting of open activations.
    pub peak_depth: usize,
}

/// A dispatch invariant broken by a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// An inner claim did not have strictly higher priority than the outer one.
    PriorityInversion {
        outer: SourceId,
        outer_priority: Priority,
        inner: SourceId,
        inner_priority: Priority,
    },
    /// A completion with no claim in flight.
    UnpairedCompletion(SourceId),
    /// Completions did not unwind in LIFO order.
    CompletionOrder { expected: SourceId, found: SourceId },
    /// The threshold differed from its pre-claim value at completion
    /// (`source` set) or at the end of the trace (`source` empty).
    ThresholdNotRestored {
        source: Option<SourceId>,
        expected: Priority,
        found: Priority,
    },
    /// Claims still in flight at the end of the trace.
    UnfinishedClaims(usize),
    /// Nesting deeper than the auditor tracks.
    NestingTooDeep,
    /// The trace lost events.
    TraceOverflow,
}

impl core::fmt::Display for Violation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Violation::PriorityInversion {
                outer,
                outer_priority,
                inner,
                inner_priority,
            } => write!(
                f,
                "source {} (priority {}) preempted source {} (priority {})",
                inner, inner_priority, outer, outer_priority
            ),
            Violation::UnpairedCompletion(s) => write!(f, "source {} completed without claim", s),
            Violation::CompletionOrder { expected, found } => {
                write!(f, "expected completion of {}, found {}", expected, found)
            }
            Violation::ThresholdNotRestored {
                source: Some(s),
                expected,
                found,
            } => write!(
                f,
                "threshold {} instead of {} when completing {}",
                found, expected, s
            ),
            Violation::ThresholdNotRestored {
                source: None,
                expected,
                found,
            } => write!(f, "final threshold {} instead of {}", found, expected),
            Violation::UnfinishedClaims(n) => write!(f, "{} claims never completed", n),
            Violation::NestingTooDeep => write!(f, "nesting deeper than {}", AUDIT_DEPTH),
            Violation::TraceOverflow => write!(f, "trace overflowed"),
        }
    }
}

impl core::error::Error for Violation {}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    source: SourceId,
    priority: Priority,
    threshold_before: Priority,
}

/// Checks a trace against the nested dispatch invariants.
///
/// * an inner claim has strictly higher priority than the claim it nests in,
/// * completions pair with claims in LIFO order,
/// * the threshold is back at its pre-claim value when a source completes,
/// * nothing is left in flight and the threshold ends at `initial_threshold`.
pub fn audit(events: &[Event], initial_threshold: Priority) -> Result<TraceSummary, Violation> {
    let mut summary = TraceSummary::default();
    let mut stack: StaticVec<InFlight, AUDIT_DEPTH> = StaticVec::new();
    let mut threshold = initial_threshold;

    for event in events {
        match *event {
            Event::Raise(_) => summary.raises += 1,
            Event::Trap { .. } => summary.traps += 1,
            Event::Return { .. } => {}
            Event::Spurious => summary.spurious += 1,
            Event::Handler(_) => summary.handled += 1,
            Event::SetThreshold(t) => threshold = t,
            Event::Claim { source, priority } => {
                if let Some(outer) = stack.last() {
                    if priority <= outer.priority {
                        return Err(Violation::PriorityInversion {
                            outer: outer.source,
                            outer_priority: outer.priority,
                            inner: source,
                            inner_priority: priority,
                        });
                    }
                    summary.preemptions += 1;
                }
                stack
                    .push(InFlight {
                        source,
                        priority,
                        threshold_before: threshold,
                    })
                    .map_err(|_| Violation::NestingTooDeep)?;
                summary.claims += 1;
                summary.peak_depth = summary.peak_depth.max(stack.len());
            }
            Event::Complete(source) => {
                let top = stack.pop().ok_or(Violation::UnpairedCompletion(source))?;
                if top.source != source {
                    return Err(Violation::CompletionOrder {
                        expected: top.source,
                        found: source,
                    });
                }
                if threshold != top.threshold_before {
                    return Err(Violation::ThresholdNotRestored {
                        source: Some(source),
                        expected: top.threshold_before,
                        found: threshold,
                    });
                }
                summary.completions += 1;
            }
        }
    }

    if !stack.is_empty() {
        return Err(Violation::UnfinishedClaims(stack.len()));
    }
    if threshold != initial_threshold {
        return Err(Violation::ThresholdNotRestored {
            source: None,
            expected: initial_threshold,
            found: threshold,
        });
    }
    Ok(summary)
}
