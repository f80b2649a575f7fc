/// Monotonic time source and cooperative yield for the control thread.
///
/// On the device this is backed by the system timer and a FreeRTOS delay so
/// that background tasks keep running while a download waits for data.
pub trait Clock {
    /// Milliseconds since boot.
    fn now_ms(&self) -> u64;

    /// Block the control thread for roughly `ms` milliseconds.
    fn delay_ms(&self, ms: u32);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn delay_ms(&self, ms: u32) {
        (**self).delay_ms(ms)
    }
}
