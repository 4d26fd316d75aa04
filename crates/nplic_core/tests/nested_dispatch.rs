use std::cell::RefCell;

use nplic_common::plic::{PWM1_SOURCE, PWM2_SOURCE, SOURCE_COUNT};
use nplic_core::sim::{
    Event, MAIN_PC, SimDispatcher, SimHart, SimPlic, Stimulus, TRAP_VECTOR_PC, scripted_handler,
};
use nplic_core::{Controller, Hart, NestedDispatcher, Outcome, Priority, Privilege, SourceId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Wires a model with the given sources and reactions, enables interrupts
/// and hands everything to `body`.
fn run_model<R>(
    sources: &[(SourceId, Priority)],
    reactions: &[(SourceId, SourceId)],
    body: impl FnOnce(&SimPlic, &SimHart<'_>, &SimDispatcher<'_>) -> R,
) -> R {
    let plic = SimPlic::new();
    let hart = SimHart::new(&plic);
    let mut stimulus = Stimulus::new(&hart);
    for &(trigger, raise) in reactions {
        stimulus.on(trigger, raise).unwrap();
    }
    let mut dispatcher: SimDispatcher<'_> = NestedDispatcher::new(&plic, &hart);
    for &(source, priority) in sources {
        dispatcher
            .install(source, priority, scripted_handler, &stimulus)
            .unwrap();
    }
    hart.install(&dispatcher);
    hart.enable_interrupts();
    body(&plic, &hart, &dispatcher)
}

fn claims(plic: &SimPlic) -> Vec<SourceId> {
    plic.with_trace(|events| {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Claim { source, .. } => Some(*source),
                _ => None,
            })
            .collect()
    })
}

fn pwm_sources() -> [(SourceId, Priority); 2] {
    [(PWM1_SOURCE, 2), (PWM2_SOURCE, 5)]
}

#[test]
fn single_source_is_serviced_once() {
    run_model(&[(PWM1_SOURCE, 3)], &[], |plic, hart, dispatcher| {
        assert!(dispatcher.table().is_registered(PWM1_SOURCE));
        hart.raise(PWM1_SOURCE);

        plic.with_trace(|events| {
            assert!(events.contains(&Event::Claim { source: PWM1_SOURCE, priority: 3 }));
            assert!(events.contains(&Event::SetThreshold(3)));
        });

        let summary = plic.audit(0).unwrap();
        assert_eq!(summary.claims, 1);
        assert_eq!(summary.handled, 1);
        assert_eq!(summary.completions, 1);
        assert_eq!(summary.preemptions, 0);
        assert_eq!(dispatcher.peak_depth(), 1);
        assert_eq!(dispatcher.depth(), 0);
        assert_eq!(plic.threshold(), 0);
        assert_eq!(hart.pc(), MAIN_PC);
        assert_eq!(hart.privilege(), Privilege::Machine);
        assert!(hart.global_enable());
    });
}

#[test]
fn higher_priority_source_preempts_running_handler() {
    run_model(
        &pwm_sources(),
        &[(PWM1_SOURCE, PWM2_SOURCE)],
        |plic, hart, dispatcher| {
            hart.raise(PWM1_SOURCE);

            let expected = [
                Event::Raise(PWM1_SOURCE),
                Event::Trap { pc: MAIN_PC },
                Event::Claim { source: PWM1_SOURCE, priority: 2 },
                Event::SetThreshold(2),
                Event::Handler(PWM1_SOURCE),
                Event::Raise(PWM2_SOURCE),
                Event::Trap { pc: TRAP_VECTOR_PC },
                Event::Claim { source: PWM2_SOURCE, priority: 5 },
                Event::SetThreshold(5),
                Event::Handler(PWM2_SOURCE),
                Event::SetThreshold(2),
                Event::Complete(PWM2_SOURCE),
                Event::Return { pc: TRAP_VECTOR_PC, privilege: Privilege::Machine },
                Event::SetThreshold(0),
                Event::Complete(PWM1_SOURCE),
                Event::Return { pc: MAIN_PC, privilege: Privilege::Machine },
            ];
            plic.with_trace(|events| assert_eq!(events, &expected[..]));

            let summary = plic.audit(0).unwrap();
            assert_eq!(summary.preemptions, 1);
            assert_eq!(summary.peak_depth, 2);
            assert_eq!(dispatcher.peak_depth(), 2);
            assert_eq!(hart.pc(), MAIN_PC);
            assert_eq!(hart.privilege(), Privilege::Machine);
        },
    );
}

#[test]
fn lower_priority_source_waits_for_completion() {
    run_model(
        &pwm_sources(),
        &[(PWM2_SOURCE, PWM1_SOURCE)],
        |plic, hart, dispatcher| {
            hart.raise(PWM2_SOURCE);

            assert_eq!(claims(plic), [PWM2_SOURCE, PWM1_SOURCE]);
            let summary = plic.audit(0).unwrap();
            assert_eq!(summary.preemptions, 0);
            assert_eq!(summary.completions, 2);
            assert_eq!(dispatcher.peak_depth(), 1);

            // The low-priority trap is taken from the foreground, after the
            // high-priority activation has returned.
            plic.with_trace(|events| {
                let traps: Vec<_> = events
                    .iter()
                    .filter(|e| matches!(e, Event::Trap { .. }))
                    .collect();
                assert_eq!(traps, [&Event::Trap { pc: MAIN_PC }, &Event::Trap { pc: MAIN_PC }]);
            });
            assert!(!plic.is_pending(PWM1_SOURCE));
        },
    );
}

#[test]
fn equal_priority_does_not_preempt() {
    run_model(&[(10, 3), (11, 3)], &[(10, 11)], |plic, hart, dispatcher| {
        hart.raise(10);
        assert_eq!(claims(plic), [10, 11]);
        assert_eq!(plic.audit(0).unwrap().preemptions, 0);
        assert_eq!(dispatcher.peak_depth(), 1);
    });
}

#[test]
fn three_levels_nest_and_unwind_in_order() {
    run_model(
        &[(3, 1), (4, 4), (5, 7)],
        &[(3, 4), (4, 5)],
        |plic, hart, dispatcher| {
            hart.raise(3);
            let completions: Vec<_> = plic.with_trace(|events| {
                events
                    .iter()
                    .filter_map(|e| match e {
                        Event::Complete(s) => Some(*s),
                        _ => None,
                    })
                    .collect()
            });
            assert_eq!(completions, [5, 4, 3]);
            assert_eq!(plic.audit(0).unwrap().peak_depth, 3);
            assert_eq!(dispatcher.peak_depth(), 3);
            assert_eq!(hart.privilege(), Privilege::Machine);
        },
    );
}

#[test]
fn spurious_claim_changes_nothing() {
    run_model(&pwm_sources(), &[], |plic, _hart, dispatcher| {
        plic.clear_trace();
        assert_eq!(dispatcher.dispatch(), Outcome::Spurious);
        assert_eq!(dispatcher.dispatch(), Outcome::Spurious);
        plic.with_trace(|events| assert_eq!(events, [Event::Spurious, Event::Spurious]));
        assert_eq!(plic.threshold(), 0);
        assert_eq!(dispatcher.depth(), 0);
    });
}

#[test]
fn unregistered_source_is_claimed_and_completed() {
    run_model(&pwm_sources(), &[], |plic, hart, dispatcher| {
        dispatcher.controller().set_priority(7, 3);
        dispatcher.controller().enable(7);
        hart.raise(7);

        let summary = plic.audit(0).unwrap();
        assert_eq!(summary.claims, 1);
        assert_eq!(summary.completions, 1);
        assert_eq!(summary.handled, 0);
        assert!(!plic.is_in_flight(7));
        assert_eq!(dispatcher.depth(), 0);
        assert_eq!(hart.pc(), MAIN_PC);
        assert_eq!(hart.privilege(), Privilege::Machine);
        assert!(hart.global_enable());

        // The line accepts a new request once completed.
        hart.raise(7);
        assert_eq!(claims(plic), [7, 7]);
        assert_eq!(plic.threshold(), 0);
    });
}

#[test]
fn direct_dispatch_reports_unhandled_source() {
    run_model(&[], &[], |plic, _hart, dispatcher| {
        plic.set_priority(9, 1);
        plic.enable(9);
        // Interrupts are on, so raise the line on the controller only and
        // call into the dispatcher by hand.
        plic.raise(9);
        assert_eq!(dispatcher.dispatch(), Outcome::Unhandled(9));
        assert!(plic.audit(0).is_ok());
    });
}

#[test]
fn handler_registered_through_table_is_used() {
    let plic = SimPlic::new();
    let hart = SimHart::new(&plic);
    let stimulus = Stimulus::new(&hart);
    let mut dispatcher: SimDispatcher<'_> = NestedDispatcher::new(&plic, &hart);
    dispatcher
        .table_mut()
        .register(12, scripted_handler, &stimulus)
        .unwrap();
    plic.set_priority(12, 1);
    plic.enable(12);
    hart.install(&dispatcher);
    hart.enable_interrupts();

    hart.raise(12);

    assert_eq!(plic.audit(0).unwrap().handled, 1);
}

#[test]
fn raised_threshold_is_restored_after_nesting() {
    let plic = SimPlic::new();
    let hart = SimHart::new(&plic);
    let mut stimulus = Stimulus::new(&hart);
    stimulus.on(20, 21).unwrap();
    stimulus.on(20, 22).unwrap();
    let mut dispatcher: SimDispatcher<'_> = NestedDispatcher::new(&plic, &hart);
    dispatcher.install(20, 4, scripted_handler, &stimulus).unwrap();
    dispatcher.install(21, 6, scripted_handler, &stimulus).unwrap();
    dispatcher.install(22, 2, scripted_handler, &stimulus).unwrap();
    hart.install(&dispatcher);
    plic.set_threshold(3);
    hart.enable_interrupts();

    hart.raise(20);

    assert_eq!(claims(&plic), [20, 21]);
    assert_eq!(plic.threshold(), 3);
    assert!(plic.is_pending(22));
    assert!(plic.audit(3).is_ok());
}

#[test]
fn request_during_own_handler_is_serviced_after_completion() {
    run_model(&[(30, 2)], &[(30, 30)], |plic, hart, dispatcher| {
        hart.raise(30);
        assert_eq!(claims(plic), [30, 30]);
        let summary = plic.audit(0).unwrap();
        assert_eq!(summary.completions, 2);
        assert_eq!(summary.raises, 2);
        assert_eq!(dispatcher.peak_depth(), 1);
    });
}

/// Hart wrapper that drops every write to `MPP`, as a dispatcher that only
/// saves and restores `mepc` would behave.
struct MepcOnly<'a>(&'a SimHart<'a>);

impl Hart for MepcOnly<'_> {
    fn set_global_enable(&self, enabled: bool) {
        self.0.set_global_enable(enabled)
    }
    fn return_address(&self) -> usize {
        self.0.return_address()
    }
    fn set_return_address(&self, address: usize) {
        self.0.set_return_address(address)
    }
    fn previous_privilege(&self) -> Privilege {
        self.0.previous_privilege()
    }
    fn set_previous_privilege(&self, _privilege: Privilege) {}
    fn previous_enable(&self) -> bool {
        self.0.previous_enable()
    }
    fn set_previous_enable(&self, enabled: bool) {
        self.0.set_previous_enable(enabled)
    }
}

#[test]
fn nested_return_without_mpp_restore_lands_in_user_mode() {
    let plic = SimPlic::new();
    let hart = SimHart::new(&plic);
    let mut stimulus = Stimulus::new(&hart);
    stimulus.on(PWM1_SOURCE, PWM2_SOURCE).unwrap();
    let mut dispatcher: NestedDispatcher<&SimPlic, MepcOnly<'_>, &Stimulus<'_>, SOURCE_COUNT> =
        NestedDispatcher::new(&plic, MepcOnly(&hart));
    dispatcher
        .install(PWM1_SOURCE, 2, scripted_handler, &stimulus)
        .unwrap();
    dispatcher
        .install(PWM2_SOURCE, 5, scripted_handler, &stimulus)
        .unwrap();
    hart.install(&dispatcher);
    hart.enable_interrupts();

    hart.raise(PWM1_SOURCE);

    assert_eq!(hart.pc(), MAIN_PC);
    assert_eq!(hart.privilege(), Privilege::User);
    plic.with_trace(|events| {
        assert_eq!(
            events.last(),
            Some(&Event::Return { pc: MAIN_PC, privilege: Privilege::User })
        );
    });
}

#[test]
fn configured_resume_privilege_is_used() {
    let plic = SimPlic::new();
    let hart = SimHart::new(&plic);
    let stimulus = Stimulus::new(&hart);
    let mut dispatcher: SimDispatcher<'_> =
        NestedDispatcher::new(&plic, &hart).with_resume_privilege(Privilege::User);
    dispatcher
        .install(PWM1_SOURCE, 2, scripted_handler, &stimulus)
        .unwrap();
    hart.install(&dispatcher);
    hart.enable_interrupts();

    hart.raise(PWM1_SOURCE);

    assert_eq!(hart.privilege(), Privilege::User);
}

thread_local! {
    static TRACED: RefCell<Vec<(SourceId, usize)>> = const { RefCell::new(Vec::new()) };
}

fn record_claim(source: SourceId, depth: usize) {
    TRACED.with(|t| t.borrow_mut().push((source, depth)));
}

#[test]
fn tracer_sees_source_and_depth() {
    let plic = SimPlic::new();
    let hart = SimHart::new(&plic);
    let mut stimulus = Stimulus::new(&hart);
    stimulus.on(PWM1_SOURCE, PWM2_SOURCE).unwrap();
    let mut dispatcher: SimDispatcher<'_> =
        NestedDispatcher::new(&plic, &hart).with_tracer(record_claim);
    for (source, priority) in pwm_sources() {
        dispatcher
            .install(source, priority, scripted_handler, &stimulus)
            .unwrap();
    }
    hart.install(&dispatcher);
    hart.enable_interrupts();

    hart.raise(PWM1_SOURCE);

    let traced = TRACED.with(|t| t.borrow().clone());
    assert_eq!(traced, [(PWM1_SOURCE, 1), (PWM2_SOURCE, 2)]);
}

#[test]
fn random_storms_pass_the_audit() {
    let mut rng = StdRng::seed_from_u64(0x5eed_0044);

    for _ in 0..200 {
        let count = rng.gen_range(2..=20u32);
        let sources: Vec<(SourceId, Priority)> =
            (1..=count).map(|id| (id, rng.gen_range(1..=7))).collect();
        let reactions: Vec<(SourceId, SourceId)> = (0..rng.gen_range(0..=16))
            .map(|_| (rng.gen_range(1..=count), rng.gen_range(1..=count)))
            .collect();
        let raises: Vec<SourceId> = (0..rng.gen_range(1..=24))
            .map(|_| rng.gen_range(1..=count))
            .collect();

        run_model(&sources, &reactions, |plic, hart, dispatcher| {
            for &source in &raises {
                hart.raise(source);
            }
            let summary = plic.audit(0).unwrap_or_else(|v| panic!("{v}"));
            assert_eq!(summary.claims, summary.completions);
            assert_eq!(summary.claims, summary.handled);
            assert!(summary.peak_depth <= 7);
            assert_eq!(summary.peak_depth, dispatcher.peak_depth());
            assert_eq!(dispatcher.depth(), 0);
            assert_eq!(hart.privilege(), Privilege::Machine);
            assert_eq!(hart.pc(), MAIN_PC);
            for id in 1..=count {
                assert!(!plic.is_pending(id) && !plic.is_in_flight(id));
            }
        });
    }
}
