//! Interrupt Descriptor Table for 32-bit protected mode.
//!
//! This kernel never leaves protected mode, so the 256 eight-byte gate
//! descriptors are laid out by hand, following the same
//! "hand-rolled-table + lazy_static + init() loads it" shape [`crate::gdt`]
//! uses. Each exception vector prints its own name and halts the running
//! process with an exception code; hardware interrupt vectors dispatch to
//! their device handler and send EOI.

use core::arch::naked_asm;
use core::mem::size_of;

use lazy_static::lazy_static;
use spin::Mutex;

use crate::gdt::KERNEL_CODE_SELECTOR;

const IDT_ENTRIES: usize = 256;

/// Vector of the PIT's remapped IRQ0.
const PIT_VECTOR: u8 = crate::pic::PIT_VECTOR;
/// Vector of the keyboard's remapped IRQ1.
const KEYBOARD_VECTOR: u8 = crate::pic::KEYBOARD_VECTOR;
/// Vector of the RTC's remapped IRQ8.
const RTC_VECTOR: u8 = crate::pic::RTC_VECTOR;
/// Vector of the syscall trap gate (`int 0x80`, DPL=3).
pub const SYSCALL_VECTOR: u8 = 128;

const GATE_INTERRUPT_32: u8 = 0x0E;
const GATE_TRAP_32: u8 = 0x0F;
const PRESENT: u8 = 0x80;

const fn type_attr(present: bool, dpl: u8, gate_type: u8) -> u8 {
    (if present { PRESENT } else { 0 }) | (dpl << 5) | gate_type
}

/// One 8-byte IDT gate descriptor.
#[derive(Clone, Copy)]
#[repr(C)]
struct GateDescriptor {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl GateDescriptor {
    const fn absent() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    fn new(handler: u32, selector: u16, gate_type: u8, dpl: u8) -> Self {
        Self {
            offset_low: (handler & 0xFFFF) as u16,
            selector,
            zero: 0,
            type_attr: type_attr(true, dpl, gate_type),
            offset_high: ((handler >> 16) & 0xFFFF) as u16,
        }
    }
}

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

lazy_static! {
    static ref IDT: Mutex<[GateDescriptor; IDT_ENTRIES]> =
        Mutex::new([GateDescriptor::absent(); IDT_ENTRIES]);
}

/// Build the IDT and load it with `lidt`.
///
/// # Safety
/// Must run exactly once, after [`crate::gdt::init`] (the gates reference
/// [`KERNEL_CODE_SELECTOR`]) and before interrupts are enabled.
pub unsafe fn init() {
    {
        let mut idt = IDT.lock();

        macro_rules! set_kernel_gate {
            ($vector:expr, $handler:expr) => {
                idt[$vector] = GateDescriptor::new(
                    $handler as u32,
                    KERNEL_CODE_SELECTOR,
                    GATE_INTERRUPT_32,
                    0,
                );
            };
        }

        set_kernel_gate!(0, stub_exception_00);
        set_kernel_gate!(1, stub_exception_01);
        set_kernel_gate!(2, stub_exception_02);
        set_kernel_gate!(3, stub_exception_03);
        set_kernel_gate!(4, stub_exception_04);
        set_kernel_gate!(5, stub_exception_05);
        set_kernel_gate!(6, stub_exception_06);
        set_kernel_gate!(7, stub_exception_07);
        set_kernel_gate!(8, stub_exception_08);
        set_kernel_gate!(9, stub_exception_09);
        set_kernel_gate!(10, stub_exception_0a);
        set_kernel_gate!(11, stub_exception_0b);
        set_kernel_gate!(12, stub_exception_0c);
        set_kernel_gate!(13, stub_exception_0d);
        set_kernel_gate!(14, stub_exception_0e);
        set_kernel_gate!(15, stub_exception_reserved);
        set_kernel_gate!(16, stub_exception_0f);
        set_kernel_gate!(17, stub_exception_10);
        set_kernel_gate!(18, stub_exception_11);
        set_kernel_gate!(19, stub_exception_12);
        for vector in 20..32 {
            set_kernel_gate!(vector, stub_exception_reserved);
        }

        for vector in 32..256 {
            set_kernel_gate!(vector, stub_default_interrupt);
        }
        set_kernel_gate!(usize::from(PIT_VECTOR), stub_pit);
        set_kernel_gate!(usize::from(KEYBOARD_VECTOR), stub_keyboard);
        set_kernel_gate!(usize::from(RTC_VECTOR), stub_rtc);

        idt[usize::from(SYSCALL_VECTOR)] = GateDescriptor::new(
            stub_syscall as u32,
            KERNEL_CODE_SELECTOR,
            GATE_TRAP_32,
            3,
        );
    }

    let base = {
        let guard = IDT.lock();
        core::ptr::addr_of!(guard[0]) as u32
    };
    let pointer = DescriptorTablePointer {
        limit: (size_of::<[GateDescriptor; IDT_ENTRIES]>() - 1) as u16,
        base,
    };

    // SAFETY: `pointer` describes the freshly built, 'static IDT.
    unsafe {
        core::arch::asm!("lidt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));
    }
}

/// Print the exception name, then unwind the faulting process via
/// `halt(256)`.
///
/// Never returns: `halt` resumes the parent's suspended `execute` call (or,
/// if the faulting process was its terminal's only one, re-execs the
/// shell).
extern "C" fn exception_trap(vector: u32, _error_code: u32) -> ! {
    crate::println!("{}", exception_name(vector));
    crate::serial_println!("[kernel] exception {vector} in terminal {}", crate::kernel::KERNEL.cur_terminal());
    crate::process::exec::halt(256)
}

fn exception_name(vector: u32) -> &'static str {
    match vector {
        0 => "Divide Error Exception",
        1 => "Debug Exception",
        2 => "Nonmaskable Interrupt",
        3 => "Breakpoint Exception",
        4 => "Overflow Exception",
        5 => "Bound Range Exceeded Exception",
        6 => "Invalid Opcode Exception",
        7 => "Device Not Available Exception",
        8 => "Double Fault Exception",
        9 => "Coprocessor Segment Overrun",
        10 => "Invalid TSS Exception",
        11 => "Segment Not Present",
        12 => "Stack Fault Exception",
        13 => "General Protection Exception",
        14 => "Page Fault Exception",
        16 => "x87 FPU Floating-Point Error",
        17 => "Alignment Check Exception",
        18 => "Machine-Check Exception",
        19 => "SIMD Floating-Point Exception",
        _ => "Non-handled Exception",
    }
}

/// Generate a naked per-vector exception stub that pushes a dummy error code
/// (for vectors the CPU does not push one for), then the vector number
/// itself, before falling into [`exception_common`].
macro_rules! define_exception_stub {
    ($name:ident, $vector:literal, has_error_code: $has_error_code:literal) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            if $has_error_code {
                naked_asm!("push {v}", "jmp {common}", v = const $vector, common = sym exception_common);
            } else {
                naked_asm!(
                    "push 0",
                    "push {v}",
                    "jmp {common}",
                    v = const $vector,
                    common = sym exception_common,
                );
            }
        }
    };
}

define_exception_stub!(stub_exception_00, 0, has_error_code: false);
define_exception_stub!(stub_exception_01, 1, has_error_code: false);
define_exception_stub!(stub_exception_02, 2, has_error_code: false);
define_exception_stub!(stub_exception_03, 3, has_error_code: false);
define_exception_stub!(stub_exception_04, 4, has_error_code: false);
define_exception_stub!(stub_exception_05, 5, has_error_code: false);
define_exception_stub!(stub_exception_06, 6, has_error_code: false);
define_exception_stub!(stub_exception_07, 7, has_error_code: false);
define_exception_stub!(stub_exception_08, 8, has_error_code: true);
define_exception_stub!(stub_exception_09, 9, has_error_code: false);
define_exception_stub!(stub_exception_0a, 10, has_error_code: true);
define_exception_stub!(stub_exception_0b, 11, has_error_code: true);
define_exception_stub!(stub_exception_0c, 12, has_error_code: true);
define_exception_stub!(stub_exception_0d, 13, has_error_code: true);
define_exception_stub!(stub_exception_0e, 14, has_error_code: true);
define_exception_stub!(stub_exception_0f, 16, has_error_code: false);
define_exception_stub!(stub_exception_10, 17, has_error_code: true);
define_exception_stub!(stub_exception_11, 18, has_error_code: false);
define_exception_stub!(stub_exception_12, 19, has_error_code: false);
define_exception_stub!(stub_exception_reserved, 255, has_error_code: false);

/// Shared tail for every exception stub: save the general registers (so the
/// values are available to a debugger / future extension even though
/// `exception_trap` never returns to restore them), then call into the
/// Rust-level dispatcher with the vector and error code the stub pushed.
#[unsafe(naked)]
unsafe extern "C" fn exception_common() {
    naked_asm!(
        "pushad",
        "mov eax, [esp + 32]", // vector, pushed before error code below it on stack
        "mov edx, [esp + 36]", // error code
        "push edx",
        "push eax",
        "call {trap}",
        trap = sym exception_trap,
    );
}

/// Default handler for every vector this kernel never arms a device on:
/// return immediately, no EOI (no PIC line feeds an unmapped vector).
#[unsafe(naked)]
unsafe extern "C" fn stub_default_interrupt() {
    naked_asm!("iretd");
}

#[unsafe(naked)]
unsafe extern "C" fn stub_pit() {
    naked_asm!(
        "pushad",
        "call {handler}",
        "popad",
        "iretd",
        handler = sym crate::pit::handler,
    );
}

#[unsafe(naked)]
unsafe extern "C" fn stub_keyboard() {
    naked_asm!(
        "pushad",
        "call {handler}",
        "popad",
        "iretd",
        handler = sym crate::terminal::keyboard::interrupt_handler,
    );
}

#[unsafe(naked)]
unsafe extern "C" fn stub_rtc() {
    naked_asm!(
        "pushad",
        "call {handler}",
        "popad",
        "iretd",
        handler = sym crate::rtc::handler,
    );
}

/// Trap gate for `int 0x80`. Calling convention: syscall number in EAX, up
/// to three arguments in EBX/ECX/EDX, return value in EAX. Reads the
/// pushad-saved copies of those four registers, forwards
/// them as ordinary cdecl arguments to [`crate::syscall::dispatch_from_registers`],
/// then patches the return value back into the slot `popad` will restore EAX
/// from.
#[unsafe(naked)]
unsafe extern "C" fn stub_syscall() {
    naked_asm!(
        "pushad",
        "mov eax, [esp + 28]", // saved eax: syscall number
        "mov ebx, [esp + 16]", // saved ebx: arg1
        "mov ecx, [esp + 24]", // saved ecx: arg2
        "mov edx, [esp + 20]", // saved edx: arg3
        "push edx",
        "push ecx",
        "push ebx",
        "push eax",
        "call {dispatch}",
        "add esp, 16",
        "mov [esp + 28], eax", // overwrite the pushad-saved EAX with the return value
        "popad",
        "iretd",
        dispatch = sym crate::syscall::dispatch_from_registers,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn exception_names_cover_defined_vectors() {
        assert_eq!(exception_name(0), "Divide Error Exception");
        assert_eq!(exception_name(14), "Page Fault Exception");
        assert_eq!(exception_name(20), "Non-handled Exception");
    }

    #[test_case]
    fn gate_type_attr_encodes_present_dpl_and_type() {
        assert_eq!(type_attr(true, 0, GATE_INTERRUPT_32), 0x8E);
        assert_eq!(type_attr(true, 3, GATE_TRAP_32), 0xEF);
    }
}
