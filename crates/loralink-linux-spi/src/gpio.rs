//! GPIO lines through the Linux GPIO character device
//!
//! Each pin touched by the transport becomes its own line request, so
//! changing one pin's direction never disturbs another.

use std::collections::HashMap;
use std::sync::Arc;

use gpiocdev::line::{Bias, Offset, Value};
use gpiocdev::request::{Config, Request};
use loralink_core::PinMode;

use crate::error::{LinuxSpiError, Result};

const CONSUMER: &str = "loralink";

/// One requested line and how it is currently configured
struct Line {
    request: Arc<Request>,
    mode: PinMode,
}

/// Lines requested on one GPIO chip
pub(crate) struct GpioBank {
    chip: String,
    lines: HashMap<Offset, Line>,
}

impl GpioBank {
    pub(crate) fn new(chip: impl Into<String>) -> Self {
        Self {
            chip: chip.into(),
            lines: HashMap::new(),
        }
    }

    fn request(&self, offset: Offset, mode: PinMode, initial: bool) -> Result<Request> {
        let mut cfg = Config::default();
        match mode {
            PinMode::Output => {
                cfg.with_line(offset).as_output(to_value(initial));
            }
            PinMode::Input => {
                cfg.with_line(offset).as_input();
            }
            PinMode::InputPullup => {
                cfg.with_line(offset).as_input().with_bias(Bias::PullUp);
            }
        }

        Request::from_config(cfg)
            .on_chip(&self.chip)
            .with_consumer(CONSUMER)
            .request()
            .map_err(|source| LinuxSpiError::LineRequestFailed {
                chip: self.chip.clone(),
                line: offset,
                source,
            })
    }

    /// Configure `offset`, re-requesting the line if its mode changes
    pub(crate) fn set_mode(&mut self, offset: Offset, mode: PinMode) -> Result<()> {
        if self.lines.get(&offset).map(|l| l.mode) == Some(mode) {
            return Ok(());
        }
        // Release the old request before asking for the line again
        self.lines.remove(&offset);
        let request = self.request(offset, mode, false)?;
        log::debug!("linux_spi: GPIO line {} configured as {:?}", offset, mode);
        self.lines.insert(
            offset,
            Line {
                request: Arc::new(request),
                mode,
            },
        );
        Ok(())
    }

    pub(crate) fn write(&mut self, offset: Offset, high: bool) -> Result<()> {
        if let Some(line) = self.lines.get(&offset).filter(|l| l.mode == PinMode::Output) {
            return line
                .request
                .set_value(offset, to_value(high))
                .map(|_| ())
                .map_err(LinuxSpiError::SetValueFailed);
        }

        // Request as an output already at the wanted level
        self.lines.remove(&offset);
        let request = self.request(offset, PinMode::Output, high)?;
        self.lines.insert(
            offset,
            Line {
                request: Arc::new(request),
                mode: PinMode::Output,
            },
        );
        Ok(())
    }

    pub(crate) fn read(&mut self, offset: Offset) -> Result<bool> {
        let line = self.input_line(offset)?;
        read_line(&line, offset)
    }

    /// Shared handle to `offset` as an input, for the interrupt monitor
    pub(crate) fn input_line(&mut self, offset: Offset) -> Result<Arc<Request>> {
        let is_input = matches!(
            self.lines.get(&offset).map(|l| l.mode),
            Some(PinMode::Input) | Some(PinMode::InputPullup)
        );
        if !is_input {
            self.set_mode(offset, PinMode::Input)?;
        }
        self.lines
            .get(&offset)
            .map(|l| Arc::clone(&l.request))
            .ok_or_else(|| LinuxSpiError::InvalidParameter(format!("GPIO line {}", offset)))
    }

    /// Release every line
    pub(crate) fn release_all(&mut self) {
        if !self.lines.is_empty() {
            log::debug!("linux_spi: Releasing {} GPIO line(s)", self.lines.len());
        }
        self.lines.clear();
    }
}

pub(crate) fn read_line(request: &Request, offset: Offset) -> Result<bool> {
    request
        .value(offset)
        .map(|v| v == Value::Active)
        .map_err(LinuxSpiError::GetValueFailed)
}

fn to_value(high: bool) -> Value {
    if high {
        Value::Active
    } else {
        Value::Inactive
    }
}

/// Edge detector for an active-high line
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RisingEdge {
    was_high: bool,
}

impl RisingEdge {
    /// Feed one sample; true exactly when the line has just gone high
    pub(crate) fn update(&mut self, high: bool) -> bool {
        let fired = high && !self.was_high;
        self.was_high = high;
        fired
    }
}
