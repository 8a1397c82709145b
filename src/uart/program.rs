//! Hand-assembled PIO programs for the two channel directions.
//!
//! Instruction 0 of both programs is a placeholder `set x, n`; the allocator
//! overwrites it with the frame width of the active configuration.

/// Relocatable PIO program. `wrap_target`/`wrap` are relative to the load
/// offset.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PioProgram {
    pub instructions: &'static [u16],
    pub wrap_target: u8,
    pub wrap: u8,
}

/// Samples the pin twice per bit period after the falling start edge and
/// pushes the whole capture.
pub const RX: PioProgram = PioProgram {
    instructions: &[
        0xe032, //  0: set    x, 18
        0x2020, //  1: wait   0 pin, 0
        0xa047, //  2: mov    y, osr
        0x0083, //  3: jmp    y--, 3
        0x4001, //  4: in     pins, 1
        0x0042, //  5: jmp    x--, 2
        0x8020, //  6: push   block
    ],
    wrap_target: 0,
    wrap: 6,
};

/// Shifts one frame word out LSB first, one bit per period held in ISR.
pub const TX: PioProgram = PioProgram {
    instructions: &[
        0xe029, //  0: set    x, 9
        0x98a0, //  1: pull   block           side 1
        0x6001, //  2: out    pins, 1
        0xa046, //  3: mov    y, isr
        0x0084, //  4: jmp    y--, 4
        0x0042, //  5: jmp    x--, 2
    ],
    wrap_target: 0,
    wrap: 5,
};

/// Instructions spent per half bit by the receive loop outside the delay.
pub const RX_LOOP_OVERHEAD: u32 = 7;
/// Instructions spent per bit by the transmit loop outside the delay.
pub const TX_LOOP_OVERHEAD: u32 = 2;
