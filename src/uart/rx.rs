use tinyvec::ArrayVec;

use super::{check_pin, program, Placement, RxRoute, UartConfig, UartError, UartPio};
use crate::{
    pio::{encode_pull, PinSetup, PioBlock, SmConfig},
    rb::{Consumer, Producer, Ringbuf},
};

/// Longest line `read_line`/`read_string_until` return. Bytes past this are
/// dropped until the terminator arrives; the line is still delivered.
pub const LINE_CAPACITY: usize = 100;

/// Turns one capture word into a data byte.
///
/// The receive program samples every bit twice; after aligning the capture,
/// bit `2b` holds the mid-bit sample of data bit `b`.
pub(crate) fn decode_frame(word: u32, frame_bits: u8, config: &UartConfig) -> u8 {
    debug_assert!((1..=31).contains(&frame_bits));
    let decode = word >> (33 - frame_bits as u32);
    let mut val = 0u32;
    for b in 0..=config.data_bits as u32 {
        if decode & (1 << (b * 2)) != 0 {
            val |= 1 << b;
        }
    }
    (val & config.data_mask()) as u8
}

/// Receive channel.
///
/// Bytes are decoded by [`UartPio::on_interrupt`] into a `'static`
/// [`Ringbuf`]; this handle is the main-loop side of it.
pub struct UartRx<'a, P: PioBlock, const N: usize> {
    uart: &'a UartPio<P>,
    pin: u8,
    frame_bits: u8,
    sm: Option<u8>,
    producer: Option<Producer<N>>,
    consumer: Consumer<N>,
    ring: &'static Ringbuf<N>,
    line: ArrayVec<[u8; LINE_CAPACITY]>,
    line_done: bool,
    truncated: bool,
}

impl<'a, P: PioBlock, const N: usize> UartRx<'a, P, N> {
    /// Takes ownership of `ring`. Does not touch the hardware.
    pub fn init(uart: &'a UartPio<P>, pin: u8, ring: &'static Ringbuf<N>) -> Result<Self, UartError> {
        check_pin(pin)?;
        let (producer, consumer) = ring.try_split().ok_or(UartError::BufferInUse)?;
        Ok(Self {
            uart,
            pin,
            frame_bits: 0,
            sm: None,
            producer: Some(producer),
            consumer,
            ring,
            line: ArrayVec::new(),
            line_done: false,
            truncated: false,
        })
    }

    /// Claims a state machine, loads the receive program and starts
    /// sampling. Captures are routed to this channel's ring buffer once
    /// [`UartPio::start`] enables the interrupt.
    pub fn activate(&mut self) -> Result<(), UartError> {
        if self.sm.is_some() || self.producer.is_none() {
            return Err(UartError::AlreadyActive);
        }
        let config = *self.uart.config();
        config.validate()?;

        let pio = self.uart.pio();
        let divisor = (pio.sys_clock_hz() / (config.baud * 2))
            .checked_sub(program::RX_LOOP_OVERHEAD)
            .ok_or(UartError::InvalidConfig)?;

        self.frame_bits = config.rx_frame_bits();
        let Placement { offset, sm } = self
            .uart
            .claim_program(&program::RX, self.frame_bits)
            .inspect_err(|e| log_warn!("rx on pin {} not placed: {:?}", self.pin, e))?;

        pio.setup_pin(
            self.pin,
            PinSetup {
                output: false,
                pull_up: true,
            },
        );
        pio.set_pin_dir(sm, self.pin, false);
        pio.init_sm(
            sm,
            &SmConfig {
                initial_pc: offset,
                wrap_target: offset + program::RX.wrap_target,
                wrap: offset + program::RX.wrap,
                in_base: self.pin,
                jmp_pin: self.pin,
                in_shift_right: true,
                ..SmConfig::default()
            },
        );
        pio.clear_fifos(sm);

        // Phase divider goes into OSR without spending program memory
        pio.push_tx(sm, divisor);
        pio.exec(sm, encode_pull(false, false));

        if let Some(producer) = self.producer.take() {
            self.uart.register_rx(
                sm,
                RxRoute {
                    sink: producer.into_sink(),
                    frame_bits: self.frame_bits,
                },
            );
        }
        pio.set_enabled(sm, true);
        self.sm = Some(sm);

        log_info!("rx active on pin {}, sm {}, offset {}", self.pin, sm, offset);
        Ok(())
    }

    pub fn uart(&self) -> &'a UartPio<P> {
        self.uart
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

    pub fn frame_bits(&self) -> u8 {
        self.frame_bits
    }

    /// Bytes currently queued.
    pub fn available(&self) -> usize {
        self.consumer.available()
    }

    pub fn read(&mut self) -> Option<u8> {
        self.consumer.try_read()
    }

    /// Drains queued bytes until `terminator` or until the queue is empty and
    /// returns what was gathered, without the terminator.
    ///
    /// The result may be a partial line. Any line `read_line` was assembling
    /// is discarded. The slice lives until the next read on this channel.
    pub fn read_string_until(&mut self, terminator: u8) -> &[u8] {
        self.reset_line();
        while let Some(b) = self.consumer.try_read() {
            if b == terminator {
                break;
            }
            self.push_line_byte(b);
        }
        self.line.as_slice()
    }

    /// Returns the next complete line, without the terminator.
    ///
    /// A line that is still arriving stays in the channel's line buffer and
    /// is continued by the next call. The slice lives until the next read on
    /// this channel.
    pub fn read_line(&mut self, terminator: u8) -> Option<&[u8]> {
        if self.line_done {
            self.reset_line();
        }
        while let Some(b) = self.consumer.try_read() {
            if b == terminator {
                self.line_done = true;
                if self.truncated {
                    log_warn!("line on pin {} truncated to {} bytes", self.pin, LINE_CAPACITY);
                }
                return Some(self.line.as_slice());
            }
            self.push_line_byte(b);
        }
        None
    }

    /// Stops routing captures to this channel and gives up the handle. The
    /// state machine and instruction memory stay claimed.
    pub fn free(self) {}

    fn reset_line(&mut self) {
        self.line.clear();
        self.line_done = false;
        self.truncated = false;
    }

    fn push_line_byte(&mut self, b: u8) {
        if self.line.try_push(b).is_some() {
            self.truncated = true;
        }
    }

    pub fn ring(&self) -> &'static Ringbuf<N> {
        self.ring
    }
}

impl<P: PioBlock, const N: usize> Drop for UartRx<'_, P, N> {
    fn drop(&mut self) {
        if let Some(sm) = self.sm.take() {
            self.uart.pio().set_rx_irq(sm, false);
            self.uart.unregister_rx(sm);
        }
    }
}
