//! Audible feedback device.

use embedded_hal::digital::OutputPin;

/// Length of one buzzer duration unit.
pub const BUZZER_UNIT_MS: u32 = 100;

/// Something that can beep for a while.
pub trait Buzzer {
    /// Sound for `units` * [`BUZZER_UNIT_MS`]; `0` silences immediately.
    fn set(&mut self, units: u16, now_ms: u32);

    /// Remaining alarm time, 0 when silent.
    fn remaining_ms(&self, now_ms: u32) -> u32;

    /// Advance timers; called once per poll tick.
    fn poll(&mut self, _now_ms: u32) {}
}

/// Placeholder for builds without a buzzer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBuzzer;

impl Buzzer for NoBuzzer {
    fn set(&mut self, _units: u16, _now_ms: u32) {}

    fn remaining_ms(&self, _now_ms: u32) -> u32 {
        0
    }
}

/// Active-low buzzer on a GPIO: LOW while sounding, HIGH when idle.
pub struct PinBuzzer<P> {
    pin: P,
    alarm_end_ms: Option<u32>,
}

impl<P: OutputPin> PinBuzzer<P> {
    pub fn new(mut pin: P) -> Self {
        if pin.set_high().is_err() {
            log::warn!("[BUZ] unable to idle buzzer pin");
        }
        Self {
            pin,
            alarm_end_ms: None,
        }
    }

    pub fn is_on(&self) -> bool {
        self.alarm_end_ms.is_some()
    }

    fn silence(&mut self) {
        self.alarm_end_ms = None;
        if self.pin.set_high().is_err() {
            log::warn!("[BUZ] unable to release buzzer pin");
        }
    }
}

impl<P: OutputPin> Buzzer for PinBuzzer<P> {
    fn set(&mut self, units: u16, now_ms: u32) {
        if units == 0 {
            self.silence();
            return;
        }
        let duration = u32::from(units) * BUZZER_UNIT_MS;
        self.alarm_end_ms = Some(now_ms.wrapping_add(duration));
        log::debug!("[BUZ] alarm on for {}ms", duration);
        if self.pin.set_low().is_err() {
            log::warn!("[BUZ] unable to drive buzzer pin");
        }
    }

    fn remaining_ms(&self, now_ms: u32) -> u32 {
        match self.alarm_end_ms {
            Some(end) => {
                let left = end.wrapping_sub(now_ms);
                // past the deadline wraps to a huge value
                if left > i32::MAX as u32 {
                    0
                } else {
                    left
                }
            }
            None => 0,
        }
    }

    fn poll(&mut self, now_ms: u32) {
        if self.alarm_end_ms.is_some() && self.remaining_ms(now_ms) == 0 {
            log::debug!("[BUZ] alarm off");
            self.silence();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockOutputPin;

    #[test]
    fn beep_runs_for_units_of_100ms() {
        let pin = MockOutputPin::new();
        let mut buzzer = PinBuzzer::new(pin.clone());
        assert!(pin.is_high());

        buzzer.set(10, 1_000);
        assert!(pin.is_low());
        assert_eq!(buzzer.remaining_ms(1_000), 1_000);
        assert_eq!(buzzer.remaining_ms(1_400), 600);

        buzzer.poll(1_999);
        assert!(buzzer.is_on());
        buzzer.poll(2_000);
        assert!(!buzzer.is_on());
        assert!(pin.is_high());
        assert_eq!(buzzer.remaining_ms(2_500), 0);
    }

    #[test]
    fn zero_duration_cancels() {
        let pin = MockOutputPin::new();
        let mut buzzer = PinBuzzer::new(pin.clone());
        buzzer.set(5, 0);
        buzzer.set(0, 10);
        assert!(!buzzer.is_on());
        assert!(pin.is_high());
    }

    #[test]
    fn late_poll_still_silences() {
        let pin = MockOutputPin::new();
        let mut buzzer = PinBuzzer::new(pin.clone());
        buzzer.set(1, u32::MAX - 50);
        assert_eq!(buzzer.remaining_ms(u32::MAX - 50), 100);
        buzzer.poll(500);
        assert!(!buzzer.is_on());
    }
}
