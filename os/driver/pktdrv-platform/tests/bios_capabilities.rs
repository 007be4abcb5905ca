use pktdrv_addresses::SegmentAddress;
use pktdrv_cpu::{CpuClass, CpuFacts};
use pktdrv_platform::{
    BiosEnvironment, DosVersion, ExtendedMemory, RealModeServices, Regs, collect_facts,
    xms::XmsDriver,
};

/// A DOS 6.22 box with HIMEM and, optionally, EMM386 and a VDS provider.
struct Machine {
    emm386: bool,
    vds: bool,
    xms_calls: usize,
}

const XMS_ENTRY: SegmentAddress = SegmentAddress::new(0xC900, 0x0020);

impl RealModeServices for Machine {
    fn int86(&mut self, vector: u8, regs: Regs) -> Regs {
        match (vector, regs.ax) {
            (0x21, 0x3000) => Regs::with_ax(0x1606),
            (0x2F, 0x4300) => Regs::with_ax(0x4380),
            (0x2F, 0x4310) => Regs {
                es: XMS_ENTRY.segment,
                ..Regs::with_ax(0x4310).bx(XMS_ENTRY.offset)
            },
            (0x2F, 0x4A11) if self.emm386 => Regs::with_ax(0x00FF),
            (0x67, 0x4000) if self.emm386 => Regs::with_ax(0),
            (0x67, 0xDE00) if self.emm386 => Regs::with_ax(0),
            (0x4B, 0x8102) if self.vds => Regs::with_ax(0x0100),
            (0x4B, _) => Regs {
                cflag: true,
                ..regs
            },
            _ => regs,
        }
    }

    fn far_call(&mut self, entry: SegmentAddress, regs: Regs) -> Regs {
        assert_eq!(entry, XMS_ENTRY);
        self.xms_calls += 1;
        match regs.ah() {
            0x00 => Regs::with_ax(0x0300),
            0x08 => Regs::with_ax(15_360).dx(15_360),
            _ => Regs::with_ax(0).bx(0x80),
        }
    }

    fn vector(&mut self, vector: u8) -> SegmentAddress {
        match vector {
            0x67 if self.emm386 => SegmentAddress::new(0xC400, 0x0040),
            0x4B if self.vds => SegmentAddress::new(0xC400, 0x0080),
            _ => SegmentAddress::default(),
        }
    }
}

fn machine(emm386: bool, vds: bool) -> Machine {
    Machine {
        emm386,
        vds,
        xms_calls: 0,
    }
}

#[test]
fn himem_only_box() {
    let mut env = BiosEnvironment::new(machine(false, false), CpuFacts::for_class(CpuClass::I80486));
    let facts = collect_facts(&mut env);

    assert!(!facts.mediated_dma);
    assert!(facts.xms_present);
    assert!(facts.himem_only());
    assert_eq!(facts.dos_version, DosVersion::new(6, 22));

    let mut xms = XmsDriver::open(env.into_inner());
    assert!(ExtendedMemory::is_available(&xms));
    assert_eq!(xms.query().unwrap().largest_block_kb, 15_360);
}

#[test]
fn emm386_without_vds() {
    let mut env = BiosEnvironment::new(machine(true, false), CpuFacts::for_class(CpuClass::Pentium));
    let facts = collect_facts(&mut env);

    let managers = facts.paging.unwrap();
    assert!(managers.emm386());
    assert!(managers.vcpi());
    assert!(!managers.qemm());
    assert!(!facts.himem_only());
}

#[test]
fn emm386_with_vds() {
    let mut env = BiosEnvironment::new(machine(true, true), CpuFacts::for_class(CpuClass::Pentium));
    let facts = collect_facts(&mut env);

    assert!(facts.mediated_dma);
    assert_eq!(facts.paging, None);
    assert_eq!(env.into_inner().xms_calls, 0, "detection never calls the XMS driver");
}
