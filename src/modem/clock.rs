use std::time::Instant;

use esp_idf_hal::delay::FreeRtos;
use fetch_core::Clock;

/// Monotonic time from boot; yields by sleeping the calling task for one tick
pub struct FreeRtosClock {
    origin: Instant,
}

impl FreeRtosClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Clock for FreeRtosClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        FreeRtos::delay_ms(ms.min(u32::MAX as u64) as u32);
    }

    fn yield_now(&self) {
        // Lets the idle task run and feed the task watchdog
        unsafe { esp_idf_sys::vTaskDelay(1) };
    }
}
