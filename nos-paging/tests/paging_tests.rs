//! End-to-end paging scenarios on the simulated machine

use std::sync::Arc;
use std::thread;

use mockall::mock;
use mockall::predicate::eq;
use nos_api::memory::{
    FrameAllocator, PageTableEntry, PageTableOps, PhysAddr, PtePerms, SwapSlot, VirtAddr,
};
use nos_api::{ProcessId, PAGE_SIZE};
use nos_paging::sim::{SimulatedMachine, SimulatedPageTables};
use nos_paging::sync::{DomainLock, LockDomain};
use nos_paging::{
    FaultOutcome, ResidentPage, SlotPolicy, SwapConfig, SwapError, SwapManager, SwapRecord,
};
use proptest::prelude::*;

const A: ProcessId = ProcessId(1);
const B: ProcessId = ProcessId(2);

fn page(n: usize) -> VirtAddr {
    VirtAddr::new(0x20_0000 + n * PAGE_SIZE)
}

fn setup(config: SwapConfig) -> (SimulatedMachine, SwapManager) {
    let machine = SimulatedMachine::new();
    let manager = machine.manager(config).unwrap();
    (machine, manager)
}

#[test]
fn test_round_trip_restores_bytes_and_perms() {
    let (m, mgr) = setup(SwapConfig::default());
    mgr.on_process_created(A);
    let perms = PtePerms::user_ro();
    m.map_page(A, page(0), perms, 0);
    for offset in (0..PAGE_SIZE).step_by(97) {
        m.write_byte(A, page(0), offset, (offset / 97) as u8);
    }
    let written = m.read_page(A, page(0)).unwrap();

    mgr.swap_out(A, page(0)).unwrap();
    assert!(m.read_page(A, page(0)).is_none());
    assert_eq!(m.entry(A, page(0)).perms(), Some(perms));

    mgr.swap_in(A, page(0)).unwrap();
    assert_eq!(m.read_page(A, page(0)).unwrap(), written);
    assert!(matches!(
        m.entry(A, page(0)),
        PageTableEntry::Resident { perms: p, .. } if p == perms
    ));
}

#[test]
fn test_budget_two_scenario() {
    let (m, mgr) = setup(SwapConfig::default().with_resident_budget(2));
    mgr.on_process_created(A);
    let (a1, a2, a3) = (page(1), page(2), page(3));
    for (n, va) in [a1, a2, a3].into_iter().enumerate() {
        m.map_page(A, va, PtePerms::user_rw(), n as u8 + 1);
    }

    mgr.touch(A, a1).unwrap();
    mgr.touch(A, a2).unwrap();
    mgr.touch(A, a3).unwrap();
    assert!(m.entry(A, a2).is_swapped());
    assert_eq!(
        mgr.dump_resident_list(),
        vec![ResidentPage::new(A, a3), ResidentPage::new(A, a1)]
    );

    let outcome = mgr.handle_fault(A, a2, None).unwrap();
    assert!(matches!(outcome, FaultOutcome::SwappedIn(_)));
    assert_eq!(m.read_page(A, a2).unwrap()[0], 2);

    let a1_swapped = m.entry(A, a1).is_swapped();
    let a3_swapped = m.entry(A, a3).is_swapped();
    assert!(a1_swapped ^ a3_swapped);
    // The most recent page is the one that goes.
    assert!(a3_swapped);

    let resident = mgr.dump_resident_list();
    assert_eq!(resident.len(), 2);
    assert_eq!(resident[0], ResidentPage::new(A, a2));

    let stats = mgr.get_stats(A).unwrap();
    assert_eq!((stats.faults, stats.swap_ins, stats.swap_outs), (1, 1, 2));
}

#[test]
fn test_exhaustion_boundary_has_no_side_effects() {
    let (m, mgr) = setup(SwapConfig::default().with_max_swap_pages(3));
    mgr.on_process_created(A);
    for n in 0..4 {
        m.map_page(A, page(n), PtePerms::user_rw(), n as u8);
    }
    for n in 0..3 {
        mgr.swap_out(A, page(n)).unwrap();
    }
    mgr.touch(A, page(3)).unwrap();

    let resident = mgr.dump_resident_list();
    let records = mgr.swapped_pages(A).unwrap();
    let frames = m.frames.allocated();

    assert_eq!(
        mgr.swap_out(A, page(3)),
        Err(SwapError::BackingStoreExhausted)
    );
    assert!(SwapError::BackingStoreExhausted.is_recoverable());
    assert_eq!(mgr.dump_resident_list(), resident);
    assert_eq!(mgr.swapped_pages(A).unwrap(), records);
    assert_eq!(m.frames.allocated(), frames);
    assert!(m.entry(A, page(3)).is_resident());
    assert_eq!(mgr.partition_usage(A).unwrap().in_use, 3);
}

#[test]
fn test_teardown_leaves_no_trace() {
    let (m, mgr) = setup(SwapConfig::default().with_resident_budget(4));
    mgr.on_process_created(A);
    mgr.on_process_created(B);
    for n in 0..6 {
        mgr.handle_fault(A, page(n), Some(PtePerms::user_rw())).unwrap();
    }
    mgr.handle_fault(B, page(0), Some(PtePerms::user_rw())).unwrap();

    let owned_by_a = mgr
        .dump_resident_list()
        .iter()
        .filter(|p| p.pid == A)
        .count();
    let before = mgr.resident_count();
    let summary = mgr.on_process_destroyed(A);

    assert_eq!(summary.resident_released, owned_by_a);
    assert_eq!(mgr.resident_count(), before - owned_by_a);
    assert!(mgr.dump_resident_list().iter().all(|p| p.pid != A));
    assert_eq!(mgr.get_stats(A), Err(SwapError::ProcessNotFound));
    assert_eq!(mgr.swapped_pages(A), Err(SwapError::ProcessNotFound));
    assert!(m.entry(B, page(0)).is_resident() || m.entry(B, page(0)).is_swapped());
}

#[test]
fn test_remove_is_idempotent() {
    let (m, mgr) = setup(SwapConfig::default());
    mgr.on_process_created(A);
    m.map_page(A, page(0), PtePerms::user_rw(), 0);
    m.map_page(A, page(1), PtePerms::user_rw(), 0);
    mgr.touch(A, page(0)).unwrap();
    mgr.touch(A, page(1)).unwrap();

    assert!(mgr.remove(A, page(0)));
    let after_first = mgr.dump_resident_list();
    assert!(!mgr.remove(A, page(0)));
    assert_eq!(mgr.dump_resident_list(), after_first);
}

#[test]
fn test_concurrent_swap_out_of_two_processes() {
    let machine = SimulatedMachine::new();
    let mgr = Arc::new(machine.manager(SwapConfig::default()).unwrap());
    for pid in [A, B] {
        mgr.on_process_created(pid);
        for n in 0..5 {
            machine.map_page(pid, page(n), PtePerms::user_rw(), pid.as_raw() as u8);
        }
    }

    let workers: Vec<_> = [A, B]
        .into_iter()
        .map(|pid| {
            let mgr = Arc::clone(&mgr);
            thread::spawn(move || {
                (0..5)
                    .map(|n| mgr.swap_out(pid, page(n)).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    for worker in workers {
        let slots = worker.join().unwrap();
        assert_eq!(slots, (0..5).map(SwapSlot).collect::<Vec<_>>());
    }

    for pid in [A, B] {
        let records = mgr.swapped_pages(pid).unwrap();
        assert_eq!(records.len(), 5);
        for (n, record) in records.iter().enumerate() {
            assert_eq!(*record, SwapRecord::new(page(n), SwapSlot(n)));
            assert_eq!(record.offset, n * PAGE_SIZE);
        }
    }

    // Same slot numbers, different partitions: contents stay apart.
    for pid in [A, B] {
        for n in 0..5 {
            mgr.swap_in(pid, page(n)).unwrap();
            assert_eq!(machine.read_page(pid, page(n)).unwrap()[0], pid.as_raw() as u8);
        }
    }
}

#[test]
fn test_concurrent_faults_stay_within_budget() {
    let (_machine, mgr) = setup(
        SwapConfig::default()
            .with_resident_budget(2)
            .with_max_swap_pages(1),
    );
    let mgr = Arc::new(mgr);

    let workers: Vec<_> = (0..4u32)
        .map(|t| {
            let mgr = Arc::clone(&mgr);
            thread::spawn(move || {
                let pid = ProcessId(100 + t);
                mgr.on_process_created(pid);
                for round in 0..4 {
                    for n in 0..5 {
                        let _ = mgr.handle_fault(pid, page(n + round), Some(PtePerms::user_rw()));
                        assert!(mgr.resident_count() <= mgr.budget());
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert!(mgr.dump_resident_list().len() <= 2);
}

#[test]
#[should_panic(expected = "acquired while another domain is held")]
fn test_lock_order_checker_is_active() {
    let tracker = DomainLock::new(LockDomain::Tracker, ());
    let store = DomainLock::new(LockDomain::Store, ());
    let _tracker = tracker.lock();
    let _store = store.lock();
}

#[test]
fn test_slot_policies_under_churn() {
    for (policy, expected) in [
        (SlotPolicy::Reclaim, Ok(SwapSlot(0))),
        (SlotPolicy::Monotonic, Err(SwapError::BackingStoreExhausted)),
    ] {
        let (m, mgr) = setup(
            SwapConfig::default()
                .with_max_swap_pages(4)
                .with_slot_policy(policy),
        );
        mgr.on_process_created(A);
        m.map_page(A, page(0), PtePerms::user_rw(), 9);
        for _ in 0..4 {
            mgr.swap_out(A, page(0)).unwrap();
            mgr.swap_in(A, page(0)).unwrap();
        }
        assert_eq!(mgr.swap_out(A, page(0)), expected, "{:?}", policy);
    }
}

#[test]
fn test_unmap_releases_everything() {
    let (m, mgr) = setup(SwapConfig::default());
    mgr.on_process_created(A);
    mgr.fault_in_zeroed(A, page(0), PtePerms::user_rw()).unwrap();
    mgr.fault_in_zeroed(A, page(1), PtePerms::user_rw()).unwrap();
    mgr.remove(A, page(1));
    mgr.swap_out(A, page(1)).unwrap();

    mgr.unmap_page(A, page(0)).unwrap();
    mgr.unmap_page(A, page(1)).unwrap();

    assert_eq!(m.entry(A, page(0)), PageTableEntry::Unmapped);
    assert_eq!(m.entry(A, page(1)), PageTableEntry::Unmapped);
    assert_eq!(m.frames.allocated(), 0);
    assert_eq!(mgr.resident_count(), 0);
    assert_eq!(mgr.partition_usage(A).unwrap().in_use, 0);
    assert_eq!(mgr.handle_fault(A, page(1), None), Err(SwapError::NotSwapped));
}

mock! {
    pub Frames {}

    impl FrameAllocator for Frames {
        fn alloc_frame(&self) -> Option<PhysAddr>;
        fn free_frame(&self, frame: PhysAddr);
        fn copy_from_frame(&self, frame: PhysAddr, dst: &mut [u8]);
        fn copy_to_frame(&self, frame: PhysAddr, src: &[u8]);
    }
}

#[test]
fn test_out_of_memory_keeps_page_swapped() {
    let frame = PhysAddr::new(0x9000_0000);
    let mut frames = MockFrames::new();
    frames
        .expect_copy_from_frame()
        .withf(move |f, _| *f == frame)
        .times(1)
        .returning(|_, dst| dst.fill(0x5a));
    frames.expect_free_frame().with(eq(frame)).times(1).return_const(());
    frames.expect_alloc_frame().times(1).returning(|| None);
    frames.expect_copy_to_frame().never();

    let tables = Arc::new(SimulatedPageTables::new());
    let mgr = SwapManager::new(SwapConfig::default(), Arc::new(frames), tables.clone()).unwrap();
    mgr.on_process_created(A);
    tables.write_entry(A, page(0), PageTableEntry::resident(frame, PtePerms::user_rw()));

    let slot = mgr.swap_out(A, page(0)).unwrap();
    assert_eq!(mgr.swap_in(A, page(0)), Err(SwapError::OutOfMemory));

    assert_eq!(
        tables.read_entry(A, page(0)),
        PageTableEntry::swapped(slot, PtePerms::user_rw())
    );
    assert_eq!(
        mgr.swapped_pages(A).unwrap(),
        vec![SwapRecord::new(page(0), slot)]
    );
    assert_eq!(mgr.get_stats(A).unwrap().swap_ins, 0);
    assert_eq!(mgr.partition_usage(A).unwrap().in_use, 1);
}

#[test]
fn test_global_instance() {
    let machine = SimulatedMachine::new();
    let paging = nos_paging::init_paging(
        SwapConfig::default(),
        machine.frames.clone(),
        machine.tables.clone(),
    )
    .unwrap();
    assert!(nos_paging::is_initialized());
    assert!(core::ptr::eq(paging, nos_paging::paging().unwrap()));
    assert!(nos_paging::init_paging(
        SwapConfig::default(),
        machine.frames.clone(),
        machine.tables.clone(),
    )
    .is_err());
}

proptest! {
    #[test]
    fn prop_contents_survive_any_access_pattern(
        accesses in prop::collection::vec(0usize..8, 1..120),
        budget in 1usize..5,
    ) {
        let (m, mgr) = setup(
            SwapConfig::default()
                .with_resident_budget(budget)
                .with_max_swap_pages(8),
        );
        mgr.on_process_created(A);

        for n in accesses {
            let outcome = mgr.handle_fault(A, page(n), Some(PtePerms::user_rw())).unwrap();
            if let FaultOutcome::ZeroFilled(_) = outcome {
                m.write_byte(A, page(n), 0, n as u8 + 1);
            }
            prop_assert_eq!(m.read_page(A, page(n)).unwrap()[0], n as u8 + 1);
            prop_assert!(mgr.resident_count() <= budget);
            prop_assert_eq!(m.frames.allocated(), mgr.resident_count());
        }
    }
}
