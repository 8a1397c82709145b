//! Contract of one PIO block, the timing coprocessor the UART channels run on.
//!
//! Nothing here executes PIO code; the block is a black box that loads
//! instructions, runs state machines and exposes FIFOs. [`PioBlock`] lists
//! exactly the operations the UART engines rely on so they can be driven by
//! the `rp2040-hal` backend or by a recording mock in tests.

#[cfg(test)]
pub mod mock;
#[cfg(feature = "rp2040")]
pub mod rp2040;

/// Instruction memory slots per PIO block.
pub const INSTR_MEM_SIZE: usize = 32;
/// State machines per PIO block.
pub const NUM_STATE_MACHINES: usize = 4;
/// GPIOs in bank 0, the pins a PIO block can reach.
pub const NUM_PINS: u8 = 30;

/// Pin-level setup applied when a pin is handed to a PIO block.
///
/// Input/output overrides are always cleared, so the state machine sees and
/// drives the raw pad level.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinSetup {
    pub output: bool,
    pub pull_up: bool,
}

/// Side-set configuration, mirroring `sm_config_set_sideset`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SideSet {
    /// Bit count including the enable bit when `optional`.
    pub bits: u8,
    pub optional: bool,
    pub pindirs: bool,
    pub base: u8,
}

/// State machine configuration, applied by [`PioBlock::init_sm`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SmConfig {
    /// Absolute address the state machine starts at.
    pub initial_pc: u8,
    pub wrap_target: u8,
    pub wrap: u8,
    pub in_base: u8,
    pub jmp_pin: u8,
    pub out_base: u8,
    pub out_count: u8,
    pub in_shift_right: bool,
    pub out_shift_right: bool,
    pub side_set: Option<SideSet>,
    pub join_tx: bool,
    /// Integer part of the clock divider.
    pub clkdiv: u16,
}

impl Default for SmConfig {
    fn default() -> Self {
        Self {
            initial_pc: 0,
            wrap_target: 0,
            wrap: (INSTR_MEM_SIZE - 1) as u8,
            in_base: 0,
            jmp_pin: 0,
            out_base: 0,
            out_count: 0,
            in_shift_right: true,
            out_shift_right: true,
            side_set: None,
            join_tx: false,
            clkdiv: 1,
        }
    }
}

/// One PIO block.
///
/// All methods take `&self`: implementations talk to memory-mapped registers
/// (or interior-mutable mock state) and the driver shares the block between
/// the main loop and the interrupt handler.
pub trait PioBlock {
    fn sys_clock_hz(&self) -> u32;

    fn write_instr(&self, addr: u8, instr: u16);

    /// Claims a state machine nobody owns yet. Claims are never released.
    fn claim_unused_sm(&self) -> Option<u8>;

    /// Disables the state machine, applies `config`, clears its FIFOs,
    /// restarts it and jumps to `config.initial_pc`.
    fn init_sm(&self, sm: u8, config: &SmConfig);

    /// Configures the pad of `pin`, always below [`NUM_PINS`].
    fn setup_pin(&self, pin: u8, setup: PinSetup);

    /// Drives the pin direction from inside the state machine.
    fn set_pin_dir(&self, sm: u8, pin: u8, output: bool);

    /// Drives the pin level from inside the state machine.
    fn set_pin_value(&self, sm: u8, pin: u8, high: bool);

    fn clear_fifos(&self, sm: u8);

    /// Executes one instruction immediately on the state machine.
    fn exec(&self, sm: u8, instr: u16);

    fn tx_full(&self, sm: u8) -> bool;

    fn push_tx(&self, sm: u8, word: u32);

    fn rx_empty(&self, sm: u8) -> bool;

    fn pop_rx(&self, sm: u8) -> u32;

    /// Routes "RX FIFO not empty" of `sm` to this block's IRQ0 line and
    /// unmasks that line.
    fn set_rx_irq(&self, sm: u8, enabled: bool);

    fn set_enabled(&self, sm: u8, enabled: bool);
}

impl<T: PioBlock> PioBlock for &T {
    fn sys_clock_hz(&self) -> u32 {
        (**self).sys_clock_hz()
    }
    fn write_instr(&self, addr: u8, instr: u16) {
        (**self).write_instr(addr, instr)
    }
    fn claim_unused_sm(&self) -> Option<u8> {
        (**self).claim_unused_sm()
    }
    fn init_sm(&self, sm: u8, config: &SmConfig) {
        (**self).init_sm(sm, config)
    }
    fn setup_pin(&self, pin: u8, setup: PinSetup) {
        (**self).setup_pin(pin, setup)
    }
    fn set_pin_dir(&self, sm: u8, pin: u8, output: bool) {
        (**self).set_pin_dir(sm, pin, output)
    }
    fn set_pin_value(&self, sm: u8, pin: u8, high: bool) {
        (**self).set_pin_value(sm, pin, high)
    }
    fn clear_fifos(&self, sm: u8) {
        (**self).clear_fifos(sm)
    }
    fn exec(&self, sm: u8, instr: u16) {
        (**self).exec(sm, instr)
    }
    fn tx_full(&self, sm: u8) -> bool {
        (**self).tx_full(sm)
    }
    fn push_tx(&self, sm: u8, word: u32) {
        (**self).push_tx(sm, word)
    }
    fn rx_empty(&self, sm: u8) -> bool {
        (**self).rx_empty(sm)
    }
    fn pop_rx(&self, sm: u8) -> u32 {
        (**self).pop_rx(sm)
    }
    fn set_rx_irq(&self, sm: u8, enabled: bool) {
        (**self).set_rx_irq(sm, enabled)
    }
    fn set_enabled(&self, sm: u8, enabled: bool) {
        (**self).set_enabled(sm, enabled)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Instruction encoding ////////////////////////////////////////////////////////
////////////////////////////////////////////////////////////////////////////////

const MAJOR_JMP: u16 = 0b000;
const MAJOR_MOV: u16 = 0b101;
const MAJOR_PULL: u16 = 0b100;
const MAJOR_SET: u16 = 0b111;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SetDest {
    Pins = 0b000,
    X = 0b001,
    Y = 0b010,
    PinDirs = 0b100,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MovOperand {
    Pins = 0b000,
    X = 0b001,
    Y = 0b010,
    Isr = 0b110,
    Osr = 0b111,
}

const fn major(bits: u16) -> u16 {
    bits << 13
}

/// `set dest, value`; `value` is a 5-bit immediate.
pub const fn encode_set(dest: SetDest, value: u8) -> u16 {
    major(MAJOR_SET) | ((dest as u16) << 5) | (value as u16 & 0x1f)
}

/// `pull [ifempty] [block|noblock]`
pub const fn encode_pull(if_empty: bool, block: bool) -> u16 {
    major(MAJOR_PULL) | 0x80 | ((if_empty as u16) << 6) | ((block as u16) << 5)
}

/// `mov dest, src`
pub const fn encode_mov(dest: MovOperand, src: MovOperand) -> u16 {
    major(MAJOR_MOV) | ((dest as u16) << 5) | (src as u16)
}

/// Unconditional `jmp addr`.
pub const fn encode_jmp(addr: u8) -> u16 {
    major(MAJOR_JMP) | (addr as u16 & 0x1f)
}

pub const fn is_jmp(instr: u16) -> bool {
    instr >> 13 == MAJOR_JMP
}
