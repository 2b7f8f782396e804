use anyhow::Result;
use esp_idf_hal::delay::{NON_BLOCK, TICK_RATE_HZ};
use esp_idf_hal::gpio::{AnyIOPin, InputPin, OutputPin};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::uart::{config::Config, Uart, UartDriver};
use esp_idf_hal::units::Hertz;
use fetch_core::{Transport, TransportError};
use log::{info, warn};

use super::{BAUD_RATE, RX_HEADROOM};

/// Ticks allowed for one driver write before it counts as stuck
const WRITE_TICKS: u32 = TICK_RATE_HZ;

/// `Transport` over an ESP-IDF UART driver
pub struct UartTransport<'d> {
    driver: UartDriver<'d>,
}

impl<'d> UartTransport<'d> {
    /// 8N1 at `BAUD_RATE`, RX ring sized for one chunk plus headroom
    pub fn open<U: Uart>(
        uart: impl Peripheral<P = U> + 'd,
        tx: impl Peripheral<P = impl OutputPin> + 'd,
        rx: impl Peripheral<P = impl InputPin> + 'd,
        chunk_size: usize,
    ) -> Result<Self> {
        let config = Config::new()
            .baudrate(Hertz(BAUD_RATE))
            .rx_fifo_size(chunk_size + RX_HEADROOM);

        let driver = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<AnyIOPin>::None,
            Option::<AnyIOPin>::None,
            &config,
        )?;
        info!("Modem UART ready at {} baud (rx buffer {} bytes)", BAUD_RATE, chunk_size + RX_HEADROOM);
        Ok(Self { driver })
    }
}

impl Transport for UartTransport<'_> {
    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut written = 0;
        while written < bytes.len() {
            match self.driver.write(&bytes[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) => return Err(TransportError::WriteFailed(e.to_string())),
            }
        }
        if written < bytes.len() {
            return Err(TransportError::ShortWrite { written, expected: bytes.len() });
        }
        if let Err(e) = self.driver.wait_tx_done(WRITE_TICKS) {
            warn!("UART tx not drained: {}", e);
        }
        Ok(())
    }

    fn available(&mut self) -> usize {
        self.driver.remaining_read().unwrap_or(0)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        self.driver.read(buf, NON_BLOCK).unwrap_or(0)
    }
}
