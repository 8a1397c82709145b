//! Bit-banged UART channels running on a PIO block.
//!
//! [`UartPio`] is the per-block descriptor: it owns the block, the shared
//! framing configuration, the instruction-memory bitmask and the routing
//! table the interrupt handler uses to find receive channels. Channels
//! ([`UartRx`], [`UartTx`]) borrow it, are inert after `init` and only claim
//! hardware in `activate`.
//!
//! Every channel on a block is activated first, then [`UartPio::start`]
//! enables the receive interrupts in one go. Claims made after `start` are
//! refused with [`AllocError::SteadyState`].

use core::{
    cell::RefCell,
    sync::atomic::{
        AtomicBool, AtomicU32,
        Ordering::{Acquire, Relaxed, Release},
    },
};

use critical_section::Mutex;
use thiserror::Error;

use crate::{
    pio::{encode_set, is_jmp, PioBlock, SetDest, INSTR_MEM_SIZE, NUM_PINS, NUM_STATE_MACHINES},
    rb::RxSink,
};

pub mod program;
pub mod rx;
pub mod tx;

pub use program::PioProgram;
pub use rx::UartRx;
pub use tx::UartTx;

/// Framing shared by every channel on one PIO block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartConfig {
    pub baud: u32,
    /// 5 through 8.
    pub data_bits: u8,
    /// 1 or 2.
    pub stop_bits: u8,
}

impl UartConfig {
    /// 9600 8N1, what serial GPS modules talk out of the box.
    pub const PICO: Self = Self {
        baud: 9600,
        data_bits: 8,
        stop_bits: 1,
    };

    pub fn validate(&self) -> Result<(), UartError> {
        if self.baud == 0 || !(5..=8).contains(&self.data_bits) || !(1..=2).contains(&self.stop_bits) {
            Err(UartError::InvalidConfig)
        } else {
            Ok(())
        }
    }

    /// Capture width of the receive program: every bit sampled twice, minus
    /// the trailing half of the last stop bit.
    pub const fn rx_frame_bits(&self) -> u8 {
        2 * (self.data_bits + self.stop_bits + 1) - 1
    }

    /// Bits the transmit program shifts out per frame.
    pub const fn tx_frame_bits(&self) -> u8 {
        self.data_bits + self.stop_bits + 1
    }

    pub const fn data_mask(&self) -> u32 {
        (1 << self.data_bits) - 1
    }
}

impl Default for UartConfig {
    fn default() -> Self {
        Self::PICO
    }
}

/// Why a program could not be placed on the PIO block.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AllocError {
    #[error("program does not fit the instruction buffer")]
    InstructionBuffer,
    #[error("frame width does not fit the program's bit counter")]
    ProgramStructure,
    #[error("no free region in instruction memory")]
    NoSpace,
    #[error("no free state machine")]
    NoStateMachine,
    #[error("activation after the block was started")]
    SteadyState,
}

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartError {
    #[error("allocation failed: {0}")]
    Alloc(#[from] AllocError),
    #[error("ring buffer already belongs to a channel")]
    BufferInUse,
    #[error("invalid UART configuration")]
    InvalidConfig,
    #[error("channel is not active")]
    NotActive,
    #[error("channel is already active")]
    AlreadyActive,
    #[error("no transmit channel")]
    NoTransmitter,
    #[error("pin {0} is not a bank 0 GPIO")]
    InvalidPin(u8),
}

pub(crate) fn check_pin(pin: u8) -> Result<(), UartError> {
    if pin < NUM_PINS {
        Ok(())
    } else {
        Err(UartError::InvalidPin(pin))
    }
}

/// Where a program landed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Placement {
    pub offset: u8,
    pub sm: u8,
}

/// What the interrupt handler needs to decode one receive channel.
#[derive(Copy, Clone)]
pub(crate) struct RxRoute {
    pub sink: &'static dyn RxSink,
    pub frame_bits: u8,
}

pub struct UartPio<P> {
    pio: P,
    config: UartConfig,
    used_mask: AtomicU32,
    steady: AtomicBool,
    routes: Mutex<RefCell<[Option<RxRoute>; NUM_STATE_MACHINES]>>,
}

impl<P: PioBlock> UartPio<P> {
    /// `config` is checked when a channel activates, so this stays `const`
    /// and the descriptor can live in a `static`.
    pub const fn new(pio: P, config: UartConfig) -> Self {
        Self {
            pio,
            config,
            used_mask: AtomicU32::new(0),
            steady: AtomicBool::new(false),
            routes: Mutex::new(RefCell::new([None; NUM_STATE_MACHINES])),
        }
    }

    pub fn config(&self) -> &UartConfig {
        &self.config
    }

    pub fn pio(&self) -> &P {
        &self.pio
    }

    /// Instruction slots taken so far, one bit per address.
    pub fn used_mask(&self) -> u32 {
        self.used_mask.load(Relaxed)
    }

    /// Places `program` with its bit counter set to `bits`, highest free
    /// address first, and claims a state machine to run it.
    ///
    /// Nothing is written unless both a region and a state machine are
    /// available. Regions are never given back.
    pub fn claim_program(&self, program: &PioProgram, bits: u8) -> Result<Placement, AllocError> {
        if self.steady.load(Acquire) {
            log_warn!("claim after the block was started");
            return Err(AllocError::SteadyState);
        }

        let len = program.instructions.len();
        if len == 0 || len > INSTR_MEM_SIZE {
            return Err(AllocError::InstructionBuffer);
        }
        if bits > 0x1f {
            return Err(AllocError::ProgramStructure);
        }

        let mut insns = [0u16; INSTR_MEM_SIZE];
        insns[..len].copy_from_slice(program.instructions);
        insns[0] = encode_set(SetDest::X, bits);

        let program_mask = if len == INSTR_MEM_SIZE {
            u32::MAX
        } else {
            (1u32 << len) - 1
        };
        critical_section::with(|_| {
            let used = self.used_mask.load(Acquire);
            let offset = (0..=INSTR_MEM_SIZE - len)
                .rev()
                .find(|&offset| used & (program_mask << offset) == 0)
                .ok_or(AllocError::NoSpace)?;

            let sm = self.pio.claim_unused_sm().ok_or(AllocError::NoStateMachine)?;

            for (i, &instr) in insns[..len].iter().enumerate() {
                let instr = if is_jmp(instr) {
                    instr + offset as u16
                } else {
                    instr
                };
                self.pio.write_instr((offset + i) as u8, instr);
            }
            self.used_mask.store(used | (program_mask << offset), Release);

            log_debug!("placed {} instructions at {} on sm {}", len, offset, sm);
            Ok(Placement {
                offset: offset as u8,
                sm,
            })
        })
    }

    /// Enables the receive interrupt of every activated receive channel and
    /// ends the activation phase. Call once all channels on this block are
    /// activated.
    pub fn start(&self) {
        if self.steady.load(Acquire) {
            return;
        }
        self.steady.store(true, Release);
        let routed = critical_section::with(|cs| self.routes.borrow_ref(cs).map(|route| route.is_some()));
        for (sm, _) in routed.iter().enumerate().filter(|(_, &routed)| routed) {
            self.pio.set_rx_irq(sm as u8, true);
        }
        log_info!("uart block started, rx routes {:?}", routed);
    }

    pub fn is_started(&self) -> bool {
        self.steady.load(Acquire)
    }

    pub(crate) fn register_rx(&self, sm: u8, route: RxRoute) {
        critical_section::with(|cs| {
            self.routes.borrow_ref_mut(cs)[sm as usize] = Some(route);
        });
    }

    pub(crate) fn unregister_rx(&self, sm: u8) {
        critical_section::with(|cs| {
            self.routes.borrow_ref_mut(cs)[sm as usize] = None;
        });
    }

    /// PIO IRQ0 handler body for this block: drains every routed state
    /// machine with pending captures into its ring buffer.
    ///
    /// Call this from the interrupt vector (or RTIC hardware task) bound to
    /// the block's IRQ0 line.
    pub fn on_interrupt(&self) {
        for sm in 0..NUM_STATE_MACHINES as u8 {
            if self.pio.rx_empty(sm) {
                continue;
            }
            let Some(route) = critical_section::with(|cs| self.routes.borrow_ref(cs)[sm as usize]) else {
                continue;
            };
            while !self.pio.rx_empty(sm) {
                let byte = rx::decode_frame(self.pio.pop_rx(sm), route.frame_bits, &self.config);
                if !route.sink.push_from_isr(byte) {
                    log_trace!("rx buffer full on sm {}, dropped {}", sm, byte);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pio::mock::MockPio, uart::program};

    fn pio() -> UartPio<MockPio> {
        UartPio::new(MockPio::new(125_000_000), UartConfig::PICO)
    }

    #[test]
    fn frame_widths() {
        let config = UartConfig::PICO;
        assert_eq!(config.rx_frame_bits(), 19);
        assert_eq!(config.tx_frame_bits(), 10);
        assert_eq!(config.data_mask(), 0xff);

        let seven_two = UartConfig {
            baud: 4800,
            data_bits: 7,
            stop_bits: 2,
        };
        assert_eq!(seven_two.rx_frame_bits(), 19);
        assert_eq!(seven_two.tx_frame_bits(), 10);
    }

    #[test]
    fn rejects_bad_configs() {
        assert_eq!(UartConfig::PICO.validate(), Ok(()));
        for config in [
            UartConfig { baud: 0, ..UartConfig::PICO },
            UartConfig { data_bits: 4, ..UartConfig::PICO },
            UartConfig { data_bits: 9, ..UartConfig::PICO },
            UartConfig { stop_bits: 0, ..UartConfig::PICO },
            UartConfig { stop_bits: 3, ..UartConfig::PICO },
        ] {
            assert_eq!(config.validate(), Err(UartError::InvalidConfig));
        }
    }

    #[test]
    fn places_from_the_top_and_patches_jumps() {
        let pio = pio();
        let placement = pio.claim_program(&program::RX, 19).unwrap();
        assert_eq!(placement, Placement { offset: 25, sm: 0 });
        assert_eq!(pio.used_mask(), 0x7f << 25);

        let hw = pio.pio();
        assert_eq!(hw.instr(25), Some(0xe033)); // set x, 19
        assert_eq!(hw.instr(26), Some(0x2020)); // wait 0 pin, 0
        assert_eq!(hw.instr(28), Some(0x0083 + 25)); // jmp y--, 3
        assert_eq!(hw.instr(30), Some(0x0042 + 25)); // jmp x--, 2
        assert_eq!(hw.instr(31), Some(0x8020)); // push block
        assert_eq!(hw.instr(24), None);
    }

    #[test]
    fn second_program_goes_below_the_first() {
        let pio = pio();
        pio.claim_program(&program::TX, 10).unwrap();
        let rx = pio.claim_program(&program::RX, 19).unwrap();
        assert_eq!(rx, Placement { offset: 19, sm: 1 });
        assert_eq!(pio.used_mask(), (0x3f << 26) | (0x7f << 19));
    }

    #[test]
    fn runs_out_of_instruction_memory() {
        let pio = pio();
        // Four receive programs take 28 slots; the fifth fails on memory
        // before the state machine pool is consulted
        for _ in 0..4 {
            pio.claim_program(&program::RX, 19).unwrap();
        }
        assert_eq!(pio.used_mask(), 0x0fff_ffff << 4);
        assert_eq!(pio.claim_program(&program::RX, 19), Err(AllocError::NoSpace));
    }

    #[test]
    fn runs_out_of_state_machines_without_touching_memory() {
        let pio = pio();
        pio.pio().preclaim(&[0, 1, 2, 3]);
        assert_eq!(pio.claim_program(&program::TX, 10), Err(AllocError::NoStateMachine));
        assert_eq!(pio.used_mask(), 0);
        assert_eq!(pio.pio().instr(31), None);
    }

    #[test]
    fn rejects_unbuildable_programs() {
        let pio = pio();
        assert_eq!(
            pio.claim_program(&program::RX, 32),
            Err(AllocError::ProgramStructure)
        );
        let empty = PioProgram {
            instructions: &[],
            wrap_target: 0,
            wrap: 0,
        };
        assert_eq!(pio.claim_program(&empty, 1), Err(AllocError::InstructionBuffer));
        assert_eq!(pio.used_mask(), 0);
    }

    #[test]
    fn refuses_claims_after_start() {
        let pio = pio();
        pio.on_interrupt();
        assert!(!pio.is_started());
        assert!(pio.claim_program(&program::TX, 10).is_ok());

        pio.start();
        assert!(pio.is_started());
        assert_eq!(pio.claim_program(&program::RX, 19), Err(AllocError::SteadyState));
    }

    #[test]
    fn alloc_errors_convert() {
        let err: UartError = AllocError::NoSpace.into();
        assert_eq!(err, UartError::Alloc(AllocError::NoSpace));
    }
}
