#![allow(dead_code)]

use core::convert::Infallible;
use embedded_hal::digital::{ErrorType, OutputPin};
use softpwm::{
    ChannelTable, PinBackend, PinMode, PinState, TICKS_PER_CYCLE, TickConfig, TimerBackend,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

pub const BOARD_PINS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Level written by the registry through the pin backend
    Write(u8, PinState),
    /// Direction change through the pin backend
    Mode(u8, PinMode),
    /// Level driven by the tick handler through a pin handle
    Drive(u8, PinState),
}

pub struct Board {
    pub levels: [PinState; BOARD_PINS],
    pub modes: [PinMode; BOARD_PINS],
    pub events: Vec<Event>,
    pub unresolvable: Vec<u8>,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            levels: [PinState::Low; BOARD_PINS],
            modes: [PinMode::Input; BOARD_PINS],
            events: Vec::new(),
            unresolvable: Vec::new(),
        }
    }
}

pub type SharedBoard = Rc<RefCell<Board>>;

pub struct MockPin {
    pin: u8,
    board: SharedBoard,
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut board = self.board.borrow_mut();
        board.levels[usize::from(self.pin)] = PinState::Low;
        board.events.push(Event::Drive(self.pin, PinState::Low));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut board = self.board.borrow_mut();
        board.levels[usize::from(self.pin)] = PinState::High;
        board.events.push(Event::Drive(self.pin, PinState::High));
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
pub struct NoSuchPin(pub u8);

pub struct MockPins {
    board: SharedBoard,
}

impl MockPins {
    fn check(&self, pin: u8) -> Result<usize, NoSuchPin> {
        let index = usize::from(pin);

        if index >= BOARD_PINS || self.board.borrow().unresolvable.contains(&pin) {
            return Err(NoSuchPin(pin));
        }

        Ok(index)
    }
}

impl PinBackend for MockPins {
    type Output = MockPin;
    type Error = NoSuchPin;

    fn resolve(&mut self, pin: u8) -> Result<MockPin, NoSuchPin> {
        self.check(pin)?;

        Ok(MockPin {
            pin,
            board: Rc::clone(&self.board),
        })
    }

    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), NoSuchPin> {
        let index = self.check(pin)?;
        let mut board = self.board.borrow_mut();
        board.modes[index] = mode;
        board.events.push(Event::Mode(pin, mode));
        Ok(())
    }

    fn write_level(&mut self, pin: u8, level: PinState) -> Result<(), NoSuchPin> {
        let index = self.check(pin)?;
        let mut board = self.board.borrow_mut();
        board.levels[index] = level;
        board.events.push(Event::Write(pin, level));
        Ok(())
    }
}

#[derive(Default)]
pub struct TimerLog {
    pub configured: Vec<TickConfig>,
    pub resets: Vec<u8>,
    pub fail: bool,
}

#[derive(Debug, PartialEq)]
pub struct TimerFault;

pub struct MockTimer {
    log: Rc<RefCell<TimerLog>>,
}

impl TimerBackend for MockTimer {
    type Error = TimerFault;

    fn configure_periodic_tick(&mut self, tick: &TickConfig) -> Result<(), TimerFault> {
        let mut log = self.log.borrow_mut();

        if log.fail {
            return Err(TimerFault);
        }

        log.configured.push(*tick);
        Ok(())
    }

    fn reset_counter(&mut self, value: u8) -> Result<(), TimerFault> {
        let mut log = self.log.borrow_mut();

        if log.fail {
            return Err(TimerFault);
        }

        log.resets.push(value);
        Ok(())
    }
}

pub fn mock_backends() -> (MockPins, MockTimer, SharedBoard, Rc<RefCell<TimerLog>>) {
    let board = SharedBoard::default();
    let log = Rc::new(RefCell::new(TimerLog::default()));

    (
        MockPins {
            board: Rc::clone(&board),
        },
        MockTimer {
            log: Rc::clone(&log),
        },
        board,
        log,
    )
}

pub fn level(board: &SharedBoard, pin: u8) -> PinState {
    board.borrow().levels[usize::from(pin)]
}

pub fn mode(board: &SharedBoard, pin: u8) -> PinMode {
    board.borrow().modes[usize::from(pin)]
}

pub fn events(board: &SharedBoard, pin: u8) -> Vec<Event> {
    board
        .borrow()
        .events
        .iter()
        .copied()
        .filter(|event| match *event {
            Event::Write(p, _) | Event::Mode(p, _) | Event::Drive(p, _) => p == pin,
        })
        .collect()
}

pub fn run_ticks<const N: usize>(table: &ChannelTable<MockPin, N>, ticks: u32) {
    for _ in 0..ticks {
        table.irq_handler();
    }
}

/// Run one full cycle starting at the cycle boundary and count the ticks after which
/// `pin` sits at `state`.
pub fn ticks_at<const N: usize>(
    table: &ChannelTable<MockPin, N>,
    board: &SharedBoard,
    pin: u8,
    state: PinState,
) -> u32 {
    assert_eq!(table.cycle_count(), u8::MAX, "not aligned to a cycle boundary");

    let mut count = 0;

    for _ in 0..TICKS_PER_CYCLE {
        table.irq_handler();

        if level(board, pin) == state {
            count += 1;
        }
    }

    count
}
