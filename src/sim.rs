use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{self, SpiBus};

use crate::comms::Opcode;
use crate::config::{FlashConfig, Geometry};
use crate::FlashSpi;

const WEL: u8 = 1 << 1;
const BUSY: u8 = 1 << 0;

struct State {
    memory: Vec<u8>,
    wel: bool,
    busy_polls: u32,
    stuck_busy: bool,
    absent: bool,
    reject_write_enable: bool,
    program_busy_polls: u32,
    erase_busy_polls: u32,
    manufacturer_id: u8,
    device_id: u8,
    selected: bool,
    frame: Vec<u8>,
    commands: Vec<u8>,
}

impl State {
    fn busy(&self) -> bool {
        self.stuck_busy || self.busy_polls > 0
    }

    fn status(&mut self) -> u8 {
        let mut status = if self.wel { WEL } else { 0 };
        if self.busy() {
            status |= BUSY;
            self.busy_polls = self.busy_polls.saturating_sub(1);
        }
        status
    }

    fn frame_address(&self) -> usize {
        ((self.frame[1] as usize) << 16) | ((self.frame[2] as usize) << 8) | self.frame[3] as usize
    }

    fn exchange(&mut self, byte: u8) -> u8 {
        if self.absent || !self.selected {
            return 0xFF;
        }
        let idx = self.frame.len();
        self.frame.push(byte);
        let opcode = self.frame[0];
        if opcode == Opcode::ReadStatus as u8 {
            if idx >= 1 {
                return self.status();
            }
        } else if opcode == Opcode::ReadMfDId as u8 {
            match idx {
                4 => return self.manufacturer_id,
                5 => return self.device_id,
                _ => {}
            }
        } else if opcode == Opcode::Read as u8 && idx >= 4 && !self.busy() {
            let addr = self.frame_address() + (idx - 4);
            return self.memory[addr % self.memory.len()];
        }
        0x00
    }

    fn finish_frame(&mut self) {
        let Some(&opcode) = self.frame.first() else {
            return;
        };
        self.commands.push(opcode);
        if self.busy() {
            return;
        }
        if opcode == Opcode::WriteEnable as u8 {
            if !self.reject_write_enable {
                self.wel = true;
            }
        } else if opcode == Opcode::ChipErase as u8 {
            if self.wel {
                self.memory.fill(0xFF);
                self.wel = false;
                self.busy_polls = self.erase_busy_polls;
            }
        } else if opcode == Opcode::PageProg as u8 && self.frame.len() > 4 && self.wel {
            let addr = self.frame_address();
            let base = addr & !0xFF;
            let len = self.memory.len();
            for (i, &byte) in self.frame[4..].iter().enumerate() {
                let target = (base | ((addr + i) & 0xFF)) % len;
                self.memory[target] &= byte;
            }
            self.wel = false;
            self.busy_polls = self.program_busy_polls;
        }
    }
}

/// Handle to a simulated device. Clones share the same device.
#[derive(Clone)]
pub struct SimFlash {
    state: Rc<RefCell<State>>,
    elapsed_ns: Rc<Cell<u64>>,
}

pub struct SimSpi(Rc<RefCell<State>>);
pub struct SimCs(Rc<RefCell<State>>);
pub struct SimDelay(Rc<Cell<u64>>);

pub type SimDriver = FlashSpi<SimSpi, SimCs, SimDelay>;

impl SimFlash {
    /// An erased W25X20L that reports the expected identity.
    pub fn new() -> Self {
        Self::with_geometry(Geometry::W25X20L)
    }

    pub fn with_geometry(geometry: Geometry) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                memory: std::vec![0xFF; geometry.capacity() as usize],
                wel: false,
                busy_polls: 0,
                stuck_busy: false,
                absent: false,
                reject_write_enable: false,
                program_busy_polls: 2,
                erase_busy_polls: 3,
                manufacturer_id: 0xEF,
                device_id: 0x11,
                selected: false,
                frame: Vec::new(),
                commands: Vec::new(),
            })),
            elapsed_ns: Rc::new(Cell::new(0)),
        }
    }

    pub fn bus(&self) -> (SimSpi, SimCs) {
        (SimSpi(self.state.clone()), SimCs(self.state.clone()))
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay(self.elapsed_ns.clone())
    }

    /// A driver wired to this device with the default configuration.
    pub fn driver(&self) -> SimDriver {
        self.driver_with(FlashConfig::default())
    }

    pub fn driver_with(&self, config: FlashConfig) -> SimDriver {
        let (spi, cs) = self.bus();
        FlashSpi::new(spi, cs, self.delay(), config)
    }

    pub fn with_identity(&self, manufacturer_id: u8, device_id: u8) {
        let mut state = self.state.borrow_mut();
        state.manufacturer_id = manufacturer_id;
        state.device_id = device_id;
    }

    pub fn fill(&self, value: u8) {
        self.state.borrow_mut().memory.fill(value);
    }

    pub fn load(&self, addr: usize, bytes: &[u8]) {
        self.state.borrow_mut().memory[addr..addr + bytes.len()].copy_from_slice(bytes);
    }

    pub fn memory(&self) -> Vec<u8> {
        self.state.borrow().memory.clone()
    }

    pub fn set_busy_polls(&self, polls: u32) {
        self.state.borrow_mut().busy_polls = polls;
    }

    pub fn set_erase_busy_polls(&self, polls: u32) {
        self.state.borrow_mut().erase_busy_polls = polls;
    }

    /// BUSY never clears, as with a hung or missing device.
    pub fn set_stuck_busy(&self, stuck: bool) {
        self.state.borrow_mut().stuck_busy = stuck;
    }

    /// MISO floats high: every byte reads back as 0xFF.
    pub fn set_absent(&self, absent: bool) {
        self.state.borrow_mut().absent = absent;
    }

    pub fn reject_write_enable(&self, reject: bool) {
        self.state.borrow_mut().reject_write_enable = reject;
    }

    pub fn wel(&self) -> bool {
        self.state.borrow().wel
    }

    pub fn selected(&self) -> bool {
        self.state.borrow().selected
    }

    /// Opcodes of every completed chip-select frame, in issue order.
    pub fn commands(&self) -> Vec<u8> {
        self.state.borrow().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.borrow_mut().commands.clear();
    }

    pub fn elapsed_ns(&self) -> u64 {
        self.elapsed_ns.get()
    }
}

impl spi::ErrorType for SimSpi {
    type Error = Infallible;
}

impl SpiBus for SimSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        for word in words {
            *word = state.exchange(0x00);
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        for &word in words {
            state.exchange(word);
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        for i in 0..read.len().max(write.len()) {
            let byte = state.exchange(write.get(i).copied().unwrap_or(0x00));
            if let Some(slot) = read.get_mut(i) {
                *slot = byte;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        for word in words {
            *word = state.exchange(*word);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl digital::ErrorType for SimCs {
    type Error = Infallible;
}

impl OutputPin for SimCs {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        state.selected = true;
        state.frame.clear();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        if state.selected {
            state.finish_frame();
            state.frame.clear();
        }
        state.selected = false;
        Ok(())
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.set(self.0.get() + u64::from(ns));
    }
}

/// Console sink that keeps everything written to it.
#[derive(Default)]
pub struct CaptureSink {
    pub bytes: Vec<u8>,
}

impl CaptureSink {
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap()
    }
}

impl embedded_io::ErrorType for CaptureSink {
    type Error = Infallible;
}

impl embedded_io::Write for CaptureSink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
