use pktdrv_alloc::{AllocError, AllocFlags, BlockKind, Tier};
use pktdrv_core::{CoreError, DriverConfig, MemoryCore, Services};
use pktdrv_cpu::{CpuClass, CpuFacts};
use pktdrv_dma::{CacheOps, CoherencyTier, DmaPolicy, SnoopTestResult};
use pktdrv_platform::{CapabilityFacts, DosVersion, PagingManagers};
use pktdrv_testkit::{SimConventional, SimMachine, SimMapper, SimUmb, SimVds, SimXms};

#[derive(Default)]
struct Counting {
    calls: usize,
}

impl CacheOps for Counting {
    unsafe fn flush_line(&mut self, _line: *const u8) {
        self.calls += 1;
    }
    fn flush_all(&mut self) {
        self.calls += 1;
    }
    unsafe fn touch_line(&mut self, _line: *const u8) {
        self.calls += 1;
    }
    fn fence(&mut self) {
        self.calls += 1;
    }
}

type Core = MemoryCore<SimXms, SimUmb, SimConventional, SimMapper, SimVds, Counting>;

fn facts(mediated_dma: bool, paging: PagingManagers, class: CpuClass) -> CapabilityFacts {
    CapabilityFacts {
        mediated_dma,
        dos_version: DosVersion::new(6, 22),
        xms_present: true,
        paging: Some(paging),
        cpu: CpuFacts::for_class(class),
    }
}

fn plain_486() -> CapabilityFacts {
    facts(false, PagingManagers::new(), CpuClass::I80486)
}

fn services(xms: SimXms, vds: SimVds) -> Services<SimXms, SimUmb, SimConventional, SimVds> {
    Services {
        xms,
        umb: SimUmb::d000_64k(),
        dos: SimConventional::below_640k(),
        vds,
    }
}

fn boot(machine: &SimMachine, facts: &CapabilityFacts, params: &str, vds: SimVds) -> Core {
    let config = DriverConfig::parse(params).unwrap();
    MemoryCore::init(
        facts,
        &config,
        services(SimXms::straddling_16m(), vds),
        machine.mapper(),
        Counting::default(),
        None,
    )
}

#[test]
fn direct_policy_serves_physical_buffers() {
    let machine = SimMachine::new();
    let mut core = boot(&machine, &plain_486(), "", SimVds::absent());
    assert_eq!(core.dma_policy(), DmaPolicy::Direct);

    let buf = core.allocate_dma(1536, 16, false).unwrap();
    assert_eq!(buf.physical, buf.linear);
    assert!(buf.physical.is_aligned(16));
    assert_eq!(core.dma().live(), 1);

    core.free_dma(buf.ptr.as_ptr()).unwrap();
    assert_eq!(core.dma().live(), 0);
    assert_eq!(core.stats(Tier::Extended).live_blocks, 0);
    assert!(core.teardown().is_clean());
}

#[test]
fn paging_manager_without_vds_refuses_dma() {
    let machine = SimMachine::new();
    let emm386 = facts(false, PagingManagers::new().with_emm386(true), CpuClass::I80486);
    let mut core = boot(&machine, &emm386, "", SimVds::absent());
    assert_eq!(core.dma_policy(), DmaPolicy::Forbidden);

    assert_eq!(core.allocate_dma(1536, 16, false), Err(CoreError::DmaForbidden));
    assert_eq!(
        core.allocate_dma_with_fallback(1536, 256, 16, false),
        Err(CoreError::DmaForbidden)
    );
    assert_eq!(core.stats(Tier::Extended).allocations, 0);

    // general buffers are unaffected
    let a = core
        .allocate(1514, BlockKind::PacketBuffer, AllocFlags::new())
        .unwrap();
    core.free(a.ptr.as_ptr()).unwrap();
}

#[test]
fn configuration_can_only_switch_dma_off() {
    let machine = SimMachine::new();
    for params in ["/BUSMASTER=OFF", "/PIO", "/PIO=ON"] {
        let core = boot(&machine, &plain_486(), params, SimVds::absent());
        assert_eq!(core.dma_policy(), DmaPolicy::Forbidden, "{params}");
    }

    let emm386 = facts(false, PagingManagers::new().with_emm386(true), CpuClass::I80486);
    let core = boot(&machine, &emm386, "/BUSMASTER=ON", SimVds::absent());
    assert_eq!(core.dma_policy(), DmaPolicy::Forbidden);
}

#[test]
fn common_buffer_locks_every_buffer() {
    let machine = SimMachine::new();
    let windows = facts(
        true,
        PagingManagers::new().with_windows_enhanced(true),
        CpuClass::I80486,
    );
    let vds = SimVds::new().with_remap(0x0100_0000u32.wrapping_neg() + 0x0010_0000);
    let mut core = boot(&machine, &windows, "", vds);
    assert_eq!(core.dma_policy(), DmaPolicy::CommonBuffer);

    let buf = core.allocate_dma(1024, 16, true).unwrap();
    assert_eq!(
        buf.physical.as_u32(),
        buf.linear.as_u32().wrapping_add(core.vds().remap)
    );
    assert_eq!(core.vds().outstanding_locks(), 1);
    core.free_dma(buf.ptr.as_ptr()).unwrap();
    assert_eq!(core.vds().outstanding_locks(), 0);

    // still live at unload: teardown unlocks and frees it
    core.allocate_dma(1024, 16, true).unwrap();
    assert_eq!(core.vds().outstanding_locks(), 1);
    assert!(core.teardown().is_clean());
    assert_eq!(core.vds().outstanding_locks(), 0);
    assert_eq!(core.heap().extended().backing().service().outstanding_locks(), 0);
}

#[test]
fn silent_vds_falls_back_to_pio() {
    let machine = SimMachine::new();
    let claims_vds = facts(true, PagingManagers::new(), CpuClass::I80486);
    let core = boot(&machine, &claims_vds, "", SimVds::absent());
    assert_eq!(core.dma_policy(), DmaPolicy::Forbidden);
}

#[test]
fn degrade_path_halves_down_to_the_minimum() {
    let machine = SimMachine::new();
    // only the 64 KiB upper memory window is in play
    let mut core = boot(&machine, &plain_486(), "/TIER=U", SimVds::absent());

    let buf = core
        .allocate_dma_with_fallback(0x2_0000, 0x8000, 16, false)
        .unwrap();
    assert_eq!(buf.size, 0x8000);
    assert_eq!(buf.tier, Tier::Upper);
    core.free_dma(buf.ptr.as_ptr()).unwrap();

    assert_eq!(
        core.allocate_dma_with_fallback(0x2_0000, 0x8001, 16, false),
        Err(CoreError::Alloc(AllocError::OutOfMemory))
    );
    assert_eq!(core.dma().live(), 0);
}

#[test]
fn degrade_path_stops_on_invalid_requests() {
    let machine = SimMachine::new();
    let mut core = boot(&machine, &plain_486(), "", SimVds::absent());
    assert!(matches!(
        core.allocate_dma_with_fallback(0x2_0000, 256, 16, true),
        Err(CoreError::Alloc(AllocError::InvalidArgument(_)))
    ));
}

fn boot_with_xms_at_16m(machine: &SimMachine, params: &str) -> Core {
    let config = DriverConfig::parse(params).unwrap();
    MemoryCore::init(
        &plain_486(),
        &config,
        services(
            SimXms::new(pktdrv_addresses::PhysicalAddress::new(0x0100_0000), 1024),
            SimVds::absent(),
        ),
        machine.mapper(),
        Counting::default(),
        None,
    )
}

#[test]
fn legacy_buffers_skip_extended_memory_above_16m() {
    let machine = SimMachine::new();
    let mut core = boot_with_xms_at_16m(&machine, "/DMARETRY=2");

    let buf = core.allocate_dma(4096, 16, true).unwrap();
    // too big for the 64 KiB upper memory window once padded
    assert_eq!(buf.tier, Tier::Conventional);
    assert!(buf.physical.as_u32() + 4096 <= 0x000A_0000);
    assert_eq!(core.stats(Tier::Extended).live_blocks, 0);

    core.free_dma(buf.ptr.as_ptr()).unwrap();
    assert!(core.teardown().is_clean());
}

#[test]
fn legacy_buffers_above_16m_are_unsatisfiable_at_every_size() {
    let machine = SimMachine::new();
    let mut core = boot_with_xms_at_16m(&machine, "/TIER=X /DMARETRY=2");
    assert_eq!(
        core.allocate_dma_with_fallback(4096, 1024, 16, true),
        Err(CoreError::Alloc(AllocError::ConstraintUnsatisfiable { attempts: 2 }))
    );
    assert_eq!(core.stats(Tier::Extended).live_blocks, 0);
}

#[test]
fn per_call_alignment_wins_over_the_default() {
    let machine = SimMachine::new();
    let mut core = boot(&machine, &plain_486(), "", SimVds::absent());
    assert_eq!(core.config().dma_alignment, 16);

    let buf = core.allocate_dma(1000, 64, false).unwrap();
    assert!(buf.physical.is_aligned(64));
    assert!(buf.linear.is_aligned(64));
    assert_eq!(core.dma().record(buf.ptr.as_ptr()).unwrap().usable_size, 1000);

    let degraded = core
        .allocate_dma_with_fallback(1000, 256, 256, false)
        .unwrap();
    assert!(degraded.physical.is_aligned(256));

    // the configured alignment is a floor
    let mut strict = boot(&machine, &plain_486(), "/DMAALIGN=128", SimVds::absent());
    let buf = strict.allocate_dma(1000, 16, false).unwrap();
    assert!(buf.physical.is_aligned(128));

    assert!(matches!(
        core.allocate_dma(1000, 48, false),
        Err(CoreError::Alloc(AllocError::InvalidArgument(_)))
    ));
}

#[test]
fn hooks_follow_the_coherency_plan() {
    let machine = SimMachine::new();
    let buf = [0u8; 64];

    let mut core = boot(&machine, &plain_486(), "", SimVds::absent());
    assert_eq!(core.coherency().tier, CoherencyTier::FullFlushInstruction);
    core.prepare_for_device_write(&buf);
    core.prepare_for_device_read(&buf);
    core.complete_device_read(&buf);
    // one WBINVD and one fence per hook
    assert_eq!(core.cache_sync().ops().calls, 6);

    let i386 = facts(false, PagingManagers::new(), CpuClass::I80386);
    let mut core = boot(&machine, &i386, "", SimVds::absent());
    core.prepare_for_device_write(&buf);
    core.complete_device_read(&buf);
    assert_eq!(core.cache_sync().ops().calls, 0);
}

#[test]
fn full_snooping_skips_the_hooks() {
    let machine = SimMachine::new();
    let config = DriverConfig::default();
    let mut core: Core = MemoryCore::init(
        &plain_486(),
        &config,
        services(SimXms::straddling_16m(), SimVds::absent()),
        machine.mapper(),
        Counting::default(),
        Some(SnoopTestResult::Full),
    );
    core.prepare_for_device_write(&[0; 32]);
    core.complete_device_read(&[0; 32]);
    assert_eq!(core.cache_sync().ops().calls, 0);
}

#[test]
fn disabled_xms_is_skipped() {
    let machine = SimMachine::new();
    let mut core = boot(&machine, &plain_486(), "/XMS=0", SimVds::absent());
    let a = core
        .allocate(256, BlockKind::General, AllocFlags::new())
        .unwrap();
    assert_eq!(a.tier, Tier::Upper);
    assert_eq!(core.heap().extended().backing().service().allocations, 0);
}

#[test]
fn teardown_reports_general_leaks() {
    let machine = SimMachine::new();
    let mut core = boot(&machine, &plain_486(), "", SimVds::absent());
    let kept = core
        .allocate(1514, BlockKind::PacketBuffer, AllocFlags::new())
        .unwrap();
    core.verify().unwrap();

    let report = core.teardown();
    assert_eq!(report.blocks, 1);
    assert_eq!(report.bytes, kept.size);
    assert_eq!(core.heap().extended().backing().service().live_handles(), 0);
}
