//! Device side of the modem link: UART bytes, GPIO control lines, FreeRTOS time

pub mod clock;
pub mod lines;
pub mod uart;

pub use clock::FreeRtosClock;
pub use lines::GpioControlLines;
pub use uart::UartTransport;

/// Modem UART line rate
pub const BAUD_RATE: u32 = 115_200;

/// Headroom above one chunk so the driver never drops bytes between reads
pub const RX_HEADROOM: usize = 512;
