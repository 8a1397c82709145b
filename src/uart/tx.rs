use core::fmt;

use super::{check_pin, program, Placement, UartError, UartPio};
use crate::pio::{encode_mov, encode_pull, MovOperand, PinSetup, PioBlock, SideSet, SmConfig};

/// Transmit channel.
pub struct UartTx<'a, P: PioBlock> {
    uart: &'a UartPio<P>,
    pin: u8,
    sm: Option<u8>,
}

impl<'a, P: PioBlock> UartTx<'a, P> {
    /// Does not touch the hardware.
    pub fn init(uart: &'a UartPio<P>, pin: u8) -> Result<Self, UartError> {
        check_pin(pin)?;
        Ok(Self { uart, pin, sm: None })
    }

    /// Drives the pin idle-high, loads the transmit program and starts the
    /// state machine.
    pub fn activate(&mut self) -> Result<(), UartError> {
        if self.sm.is_some() {
            return Err(UartError::AlreadyActive);
        }
        let config = *self.uart.config();
        config.validate()?;

        let pio = self.uart.pio();
        let divisor = (pio.sys_clock_hz() / config.baud)
            .checked_sub(program::TX_LOOP_OVERHEAD)
            .ok_or(UartError::InvalidConfig)?;

        let Placement { offset, sm } = self
            .uart
            .claim_program(&program::TX, config.tx_frame_bits())
            .inspect_err(|e| log_warn!("tx on pin {} not placed: {:?}", self.pin, e))?;

        // Idle level first so the line never glitches low
        pio.set_pin_value(sm, self.pin, true);
        pio.set_pin_dir(sm, self.pin, true);
        pio.setup_pin(
            self.pin,
            PinSetup {
                output: true,
                pull_up: true,
            },
        );
        pio.init_sm(
            sm,
            &SmConfig {
                initial_pc: offset,
                wrap_target: offset + program::TX.wrap_target,
                wrap: offset + program::TX.wrap,
                out_base: self.pin,
                out_count: 1,
                out_shift_right: true,
                side_set: Some(SideSet {
                    bits: 2,
                    optional: true,
                    pindirs: false,
                    base: self.pin,
                }),
                join_tx: true,
                ..SmConfig::default()
            },
        );
        pio.clear_fifos(sm);

        // Bit period goes OSR -> ISR, where the loop reloads it from
        pio.push_tx(sm, divisor);
        pio.exec(sm, encode_pull(false, false));
        pio.exec(sm, encode_mov(MovOperand::Isr, MovOperand::Osr));

        pio.set_enabled(sm, true);
        self.sm = Some(sm);

        log_info!("tx active on pin {}, sm {}, offset {}", self.pin, sm, offset);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.sm.is_some()
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    pub fn sm(&self) -> Option<u8> {
        self.sm
    }

    /// FIFO word for one frame: a zero start bit, the data bits, then the
    /// stop bits already set above them.
    pub fn frame_word(&self, byte: u8) -> u32 {
        let config = self.uart.config();
        ((byte as u32 & config.data_mask()) | (0b111 << config.data_bits)) << 1
    }

    pub fn try_write(&mut self, byte: u8) -> nb::Result<(), UartError> {
        let sm = self.sm.ok_or(nb::Error::Other(UartError::NotActive))?;
        let pio = self.uart.pio();
        if pio.tx_full(sm) {
            return Err(nb::Error::WouldBlock);
        }
        pio.push_tx(sm, self.frame_word(byte));
        Ok(())
    }

    /// Spins until the TX FIFO takes the frame.
    pub fn write(&mut self, byte: u8) -> Result<(), UartError> {
        nb::block!(self.try_write(byte))
    }

    pub fn print(&mut self, s: &str) -> Result<(), UartError> {
        s.bytes().try_for_each(|b| self.write(b))
    }

    pub fn println(&mut self, s: &str) -> Result<(), UartError> {
        self.print(s)?;
        self.write(b'\r')?;
        self.write(b'\n')
    }

    /// Gives up the handle. The state machine keeps running idle.
    pub fn free(self) {}
}

impl<P: PioBlock> fmt::Write for UartTx<'_, P> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.print(s).map_err(|_| fmt::Error)
    }
}
