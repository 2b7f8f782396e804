use anyhow::Result;
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_sys::EspError;
use fetch_core::{ControlLine, ControlLines, Level};

/// Reset and power-key outputs, both idle low
pub struct GpioControlLines<'d> {
    reset: PinDriver<'d, AnyOutputPin, Output>,
    power_key: PinDriver<'d, AnyOutputPin, Output>,
}

impl<'d> GpioControlLines<'d> {
    pub fn new(reset: AnyOutputPin, power_key: AnyOutputPin) -> Result<Self> {
        let mut reset = PinDriver::output(reset)?;
        let mut power_key = PinDriver::output(power_key)?;
        reset.set_low()?;
        power_key.set_low()?;
        Ok(Self { reset, power_key })
    }
}

impl ControlLines for GpioControlLines<'_> {
    type Error = EspError;

    fn drive(&mut self, line: ControlLine, level: Level) -> Result<(), EspError> {
        let pin = match line {
            ControlLine::Reset => &mut self.reset,
            ControlLine::PowerKey => &mut self.power_key,
        };
        match level {
            Level::High => pin.set_high(),
            Level::Low => pin.set_low(),
        }
    }
}
