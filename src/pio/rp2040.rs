//! [`PioBlock`] for the RP2040, on top of `rp2040-hal`.
//!
//! Pins reach the block through [`Rp2040Pio::take_pin`], which switches the
//! HAL pin to the block's function and yields the GPIO number the UART
//! channels are initialized with.

use core::cell::Cell;

use cortex_m::peripheral::NVIC;
use critical_section::Mutex;
use rp2040_hal::{
    gpio::{Function, Pin, PinId, PullType, ValidFunction},
    pac::{self, Interrupt},
    pio::PIOExt,
    Timer,
};

use super::{encode_jmp, encode_set, PinSetup, PioBlock, SetDest, SmConfig, NUM_PINS, NUM_STATE_MACHINES};
use crate::Clock;

pub struct Rp2040Pio<P: PIOExt> {
    pio: P,
    sys_hz: u32,
    claimed: Mutex<Cell<u8>>,
}

impl<P: PIOExt> Rp2040Pio<P> {
    /// Resets `pio` and waits until it is back. `sys_hz` is the system
    /// clock the state machines run from.
    pub fn new(pio: P, resets: &mut pac::RESETS, sys_hz: u32) -> Self {
        let pio1 = P::id() == 1;
        resets
            .reset()
            .modify(|_, w| if pio1 { w.pio1().set_bit() } else { w.pio0().set_bit() });
        resets
            .reset()
            .modify(|_, w| if pio1 { w.pio1().clear_bit() } else { w.pio0().clear_bit() });
        loop {
            let done = resets.reset_done().read();
            if (pio1 && done.pio1().bit()) || (!pio1 && done.pio0().bit()) {
                break;
            }
        }

        Self {
            pio,
            sys_hz,
            claimed: Mutex::new(Cell::new(0)),
        }
    }

    /// IRQ0 line of this block, the one [`crate::UartPio::on_interrupt`]
    /// must be bound to.
    pub fn interrupt(&self) -> Interrupt {
        if P::id() == 1 {
            Interrupt::PIO1_IRQ_0
        } else {
            Interrupt::PIO0_IRQ_0
        }
    }

    /// Gives `pin` to this block and returns its GPIO number.
    pub fn take_pin<I, F, U>(&self, pin: Pin<I, F, U>) -> u8
    where
        I: PinId + ValidFunction<P::PinFunction>,
        F: Function,
        U: PullType,
    {
        pin.into_function::<P::PinFunction>().id().num
    }

    pub fn free(self) -> P {
        self.pio
    }

    fn sm(&self, sm: u8) -> &pac::pio0::SM {
        self.pio.sm(sm as usize)
    }

    /// Runs `set <dest>, value` against a single pin, restoring the pin
    /// mapping afterwards.
    fn set_one_pin(&self, sm: u8, pin: u8, dest: SetDest, value: bool) {
        let regs = self.sm(sm);
        let pinctrl = regs.sm_pinctrl().read().bits();
        let execctrl = regs.sm_execctrl().read().bits();

        regs.sm_execctrl().modify(|_, w| w.out_sticky().clear_bit());
        // SAFETY: one pin, below NUM_PINS
        regs.sm_pinctrl()
            .write(|w| unsafe { w.set_count().bits(1).set_base().bits(pin) });
        self.exec(sm, encode_set(dest, value as u8));

        // SAFETY: values read back from the same registers
        regs.sm_pinctrl().write(|w| unsafe { w.bits(pinctrl) });
        regs.sm_execctrl().write(|w| unsafe { w.bits(execctrl) });
    }
}

impl<P: PIOExt> PioBlock for Rp2040Pio<P> {
    fn sys_clock_hz(&self) -> u32 {
        self.sys_hz
    }

    fn write_instr(&self, addr: u8, instr: u16) {
        // SAFETY: any 16-bit word is a valid instruction slot value
        self.pio
            .instr_mem(addr as usize)
            .write(|w| unsafe { w.bits(instr as u32) });
    }

    fn claim_unused_sm(&self) -> Option<u8> {
        critical_section::with(|cs| {
            let claimed = self.claimed.borrow(cs);
            let mask = claimed.get();
            let sm = (0..NUM_STATE_MACHINES as u8).find(|sm| mask & (1 << sm) == 0)?;
            claimed.set(mask | (1 << sm));
            Some(sm)
        })
    }

    fn init_sm(&self, sm: u8, config: &SmConfig) {
        self.set_enabled(sm, false);

        let regs = self.sm(sm);
        let side = config.side_set;
        // SAFETY: every field value comes from an SmConfig built within the
        // field widths (5-bit addresses and pins, 16-bit divider)
        unsafe {
            regs.sm_clkdiv()
                .write(|w| w.int().bits(config.clkdiv).frac().bits(0));
            regs.sm_execctrl().write(|w| {
                w.jmp_pin()
                    .bits(config.jmp_pin)
                    .wrap_top()
                    .bits(config.wrap)
                    .wrap_bottom()
                    .bits(config.wrap_target)
                    .side_en()
                    .bit(side.is_some_and(|s| s.optional))
                    .side_pindir()
                    .bit(side.is_some_and(|s| s.pindirs))
            });
            // Thresholds at 0 mean 32 bits
            regs.sm_shiftctrl().write(|w| {
                w.in_shiftdir()
                    .bit(config.in_shift_right)
                    .out_shiftdir()
                    .bit(config.out_shift_right)
                    .fjoin_tx()
                    .bit(config.join_tx)
                    .fjoin_rx()
                    .clear_bit()
                    .autopush()
                    .clear_bit()
                    .autopull()
                    .clear_bit()
                    .push_thresh()
                    .bits(0)
                    .pull_thresh()
                    .bits(0)
            });
            regs.sm_pinctrl().write(|w| {
                w.out_base()
                    .bits(config.out_base)
                    .out_count()
                    .bits(config.out_count)
                    .in_base()
                    .bits(config.in_base)
                    .set_count()
                    .bits(0)
                    .sideset_base()
                    .bits(side.map_or(0, |s| s.base))
                    .sideset_count()
                    .bits(side.map_or(0, |s| s.bits))
            });
        }

        self.clear_fifos(sm);
        // SAFETY: stall and overflow flags are write-one-to-clear
        self.pio.fdebug().write(|w| unsafe { w.bits(0x0101_0101 << sm) });
        critical_section::with(|_| {
            // SAFETY: strobes for this state machine only
            self.pio
                .ctrl()
                .modify(|_, w| unsafe { w.sm_restart().bits(1 << sm).clkdiv_restart().bits(1 << sm) });
        });
        self.exec(sm, encode_jmp(config.initial_pc));
    }

    fn setup_pin(&self, pin: u8, setup: PinSetup) {
        debug_assert!(pin < NUM_PINS);
        // SAFETY: only the pad of `pin` is touched, inside a critical section
        let pads = unsafe { &*pac::PADS_BANK0::ptr() };
        critical_section::with(|_| {
            pads.gpio(pin as usize).modify(|_, w| {
                w.ie()
                    .set_bit()
                    .od()
                    .bit(!setup.output)
                    .pue()
                    .bit(setup.pull_up)
                    .pde()
                    .clear_bit()
            });
        });
    }

    fn set_pin_dir(&self, sm: u8, pin: u8, output: bool) {
        self.set_one_pin(sm, pin, SetDest::PinDirs, output);
    }

    fn set_pin_value(&self, sm: u8, pin: u8, high: bool) {
        self.set_one_pin(sm, pin, SetDest::Pins, high);
    }

    fn clear_fifos(&self, sm: u8) {
        // Toggling the RX join flushes both FIFOs
        let shiftctrl = self.sm(sm).sm_shiftctrl();
        shiftctrl.modify(|r, w| w.fjoin_rx().bit(!r.fjoin_rx().bit()));
        shiftctrl.modify(|r, w| w.fjoin_rx().bit(!r.fjoin_rx().bit()));
    }

    fn exec(&self, sm: u8, instr: u16) {
        // SAFETY: instructions come from the encoders or a loaded program
        self.sm(sm).sm_instr().write(|w| unsafe { w.bits(instr as u32) });
    }

    fn tx_full(&self, sm: u8) -> bool {
        self.pio.fstat().read().txfull().bits() & (1 << sm) != 0
    }

    fn push_tx(&self, sm: u8, word: u32) {
        // SAFETY: the TX FIFO takes any word
        self.pio.txf(sm as usize).write(|w| unsafe { w.bits(word) });
    }

    fn rx_empty(&self, sm: u8) -> bool {
        self.pio.fstat().read().rxempty().bits() & (1 << sm) != 0
    }

    fn pop_rx(&self, sm: u8) -> u32 {
        self.pio.rxf(sm as usize).read().bits()
    }

    fn set_rx_irq(&self, sm: u8, enabled: bool) {
        // Bits 0..4 of IRQ0_INTE are the per-SM "RX FIFO not empty" sources
        let inte = self.pio.sm_irq(0).irq_inte();
        critical_section::with(|_| {
            // SAFETY: only this state machine's RX source changes
            inte.modify(|r, w| unsafe {
                w.bits(if enabled {
                    r.bits() | 1 << sm
                } else {
                    r.bits() & !(1 << sm)
                })
            });
        });
        if enabled {
            // SAFETY: the handler only touches state behind critical sections
            // and the SPSC ring buffers
            unsafe { NVIC::unmask(self.interrupt()) };
        } else if inte.read().bits() == 0 {
            NVIC::mask(self.interrupt());
        }
    }

    fn set_enabled(&self, sm: u8, enabled: bool) {
        critical_section::with(|_| {
            // SAFETY: only this state machine's enable bit changes
            self.pio.ctrl().modify(|r, w| unsafe {
                let mask = r.sm_enable().bits();
                w.sm_enable().bits(if enabled {
                    mask | 1 << sm
                } else {
                    mask & !(1 << sm)
                })
            });
        });
    }
}

/// Millisecond tick off the HAL's free-running microsecond timer.
pub struct Rp2040Timer {
    timer: Timer,
}

impl Rp2040Timer {
    pub fn new(timer: Timer) -> Self {
        Self { timer }
    }
}

impl Clock for Rp2040Timer {
    fn millis(&self) -> u32 {
        (self.timer.get_counter().ticks() / 1000) as u32
    }
}
