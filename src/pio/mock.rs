//! Recording PIO block for tests
//!
//! Stores everything the driver writes so tests can assert on instruction
//! memory, state machine configuration and pin setup, and lets tests inject
//! RX capture words the way a running state machine would.

use super::{encode_pull, PinSetup, PioBlock, SmConfig, INSTR_MEM_SIZE, NUM_STATE_MACHINES};
use crate::uart::UartConfig;
use core::cell::RefCell;
use std::{collections::VecDeque, vec::Vec};

#[derive(Debug, Default, Clone)]
pub struct MockSm {
    pub claimed: bool,
    pub config: Option<SmConfig>,
    pub enabled: bool,
    pub rx_irq: bool,
    pub rx: VecDeque<u32>,
    pub tx: Vec<u32>,
    pub executed: Vec<u16>,
    /// Last word a forced `pull` moved out of the TX FIFO.
    pub osr: Option<u32>,
    pub pin_dirs: Vec<(u8, bool)>,
    pub pin_values: Vec<(u8, bool)>,
    pub fifo_clears: usize,
}

#[derive(Debug)]
pub struct MockState {
    pub instr_mem: [Option<u16>; INSTR_MEM_SIZE],
    pub sms: [MockSm; NUM_STATE_MACHINES],
    pub pins: Vec<(u8, PinSetup)>,
    /// Words the TX FIFO accepts before reporting full. `None` is unbounded.
    pub tx_depth: Option<usize>,
}

#[derive(Debug)]
pub struct MockPio {
    sys_hz: u32,
    pub state: RefCell<MockState>,
}

impl MockPio {
    pub fn new(sys_hz: u32) -> Self {
        Self {
            sys_hz,
            state: RefCell::new(MockState {
                instr_mem: [None; INSTR_MEM_SIZE],
                sms: Default::default(),
                pins: Vec::new(),
                tx_depth: None,
            }),
        }
    }

    /// Marks state machines as owned by someone else.
    pub fn preclaim(&self, sms: &[u8]) {
        let mut state = self.state.borrow_mut();
        for &sm in sms {
            state.sms[sm as usize].claimed = true;
        }
    }

    /// Queues a capture word as if the state machine had pushed it.
    pub fn inject_rx(&self, sm: u8, word: u32) {
        self.state.borrow_mut().sms[sm as usize].rx.push_back(word);
    }

    pub fn tx_words(&self, sm: u8) -> Vec<u32> {
        self.state.borrow().sms[sm as usize].tx.clone()
    }

    pub fn sm(&self, sm: u8) -> MockSm {
        self.state.borrow().sms[sm as usize].clone()
    }

    pub fn instr(&self, addr: u8) -> Option<u16> {
        self.state.borrow().instr_mem[addr as usize]
    }
}

impl PioBlock for MockPio {
    fn sys_clock_hz(&self) -> u32 {
        self.sys_hz
    }

    fn write_instr(&self, addr: u8, instr: u16) {
        self.state.borrow_mut().instr_mem[addr as usize] = Some(instr);
    }

    fn claim_unused_sm(&self) -> Option<u8> {
        let mut state = self.state.borrow_mut();
        let sm = state.sms.iter().position(|sm| !sm.claimed)?;
        state.sms[sm].claimed = true;
        Some(sm as u8)
    }

    fn init_sm(&self, sm: u8, config: &SmConfig) {
        let mut state = self.state.borrow_mut();
        let sm = &mut state.sms[sm as usize];
        sm.enabled = false;
        sm.config = Some(*config);
        sm.rx.clear();
        sm.tx.clear();
    }

    fn setup_pin(&self, pin: u8, setup: PinSetup) {
        self.state.borrow_mut().pins.push((pin, setup));
    }

    fn set_pin_dir(&self, sm: u8, pin: u8, output: bool) {
        self.state.borrow_mut().sms[sm as usize]
            .pin_dirs
            .push((pin, output));
    }

    fn set_pin_value(&self, sm: u8, pin: u8, high: bool) {
        self.state.borrow_mut().sms[sm as usize]
            .pin_values
            .push((pin, high));
    }

    fn clear_fifos(&self, sm: u8) {
        let mut state = self.state.borrow_mut();
        let sm = &mut state.sms[sm as usize];
        sm.rx.clear();
        sm.tx.clear();
        sm.fifo_clears += 1;
    }

    fn exec(&self, sm: u8, instr: u16) {
        let mut state = self.state.borrow_mut();
        let sm = &mut state.sms[sm as usize];
        sm.executed.push(instr);
        if instr == encode_pull(false, false) && !sm.tx.is_empty() {
            sm.osr = Some(sm.tx.remove(0));
        }
    }

    fn tx_full(&self, sm: u8) -> bool {
        let state = self.state.borrow();
        match state.tx_depth {
            Some(depth) => state.sms[sm as usize].tx.len() >= depth,
            None => false,
        }
    }

    fn push_tx(&self, sm: u8, word: u32) {
        self.state.borrow_mut().sms[sm as usize].tx.push(word);
    }

    fn rx_empty(&self, sm: u8) -> bool {
        self.state.borrow().sms[sm as usize].rx.is_empty()
    }

    fn pop_rx(&self, sm: u8) -> u32 {
        self.state.borrow_mut().sms[sm as usize]
            .rx
            .pop_front()
            .unwrap_or(0)
    }

    fn set_rx_irq(&self, sm: u8, enabled: bool) {
        self.state.borrow_mut().sms[sm as usize].rx_irq = enabled;
    }

    fn set_enabled(&self, sm: u8, enabled: bool) {
        self.state.borrow_mut().sms[sm as usize].enabled = enabled;
    }
}

/// Capture word the receive program pushes for `byte`: `2 * frame` half-bit
/// samples (start bit, data bits LSB first, stop bits), oldest sample lowest,
/// right-aligned into the top of the ISR by the right-shifting `in`.
pub fn capture_frame(byte: u8, config: &UartConfig) -> u32 {
    let frame_bits = config.rx_frame_bits() as u32;
    let mut word = 0u32;
    for sample in 0..=frame_bits {
        let bit = sample / 2;
        let level = if bit == 0 {
            0
        } else if bit <= config.data_bits as u32 {
            (byte as u32 >> (bit - 1)) & 1
        } else {
            1
        };
        word |= level << (31 - frame_bits + sample);
    }
    word
}
