// 向 sync 注册宿主 Mock 协作者
//
// 单元测试与集成测试共用这一份实现。

use std::sync::Once;

use test_support::mock::arch::MOCK_ARCH_OPS;
use test_support::mock::sched::MOCK_SCHED_OPS;

static INIT: Once = Once::new();

struct TestArch;

impl sync::ArchOps for TestArch {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        unsafe { MOCK_ARCH_OPS.read_and_disable_interrupts() }
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        unsafe { MOCK_ARCH_OPS.restore_interrupts(flags) }
    }

    fn interrupt_enable_bit(&self) -> usize {
        MOCK_ARCH_OPS.interrupt_enable_bit()
    }

    fn cpu_id(&self) -> usize {
        MOCK_ARCH_OPS.cpu_id()
    }
}

struct TestSched;

impl sync::SchedOps for TestSched {
    fn current_thread(&self) -> usize {
        MOCK_SCHED_OPS.current_thread()
    }

    fn block_current(&self) {
        MOCK_SCHED_OPS.block_current()
    }

    fn wake(&self, tid: usize) {
        MOCK_SCHED_OPS.wake(tid)
    }
}

static TEST_ARCH: TestArch = TestArch;
static TEST_SCHED: TestSched = TestSched;

/// 每个测试二进制只注册一次
pub fn init() {
    INIT.call_once(|| unsafe {
        sync::register_arch_ops(&TEST_ARCH);
        sync::register_sched_ops(&TEST_SCHED);
    });
}
