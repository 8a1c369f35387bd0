use std::collections::HashMap;

use mac_address::MacAddress;

use crate::advertisement::ButtonState;
use crate::error::TelemetryError;

/// Turns the puck's rolling press counter into press events.
///
/// The counter is a modulo-256 value the puck bumps on every press, and the
/// same reading is re-advertised many times, so only a change counts.
#[derive(Debug, Default)]
pub struct ButtonDebouncer {
    last_counter: HashMap<MacAddress, u8>,
}

impl ButtonDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of presses since the previous reading when the
    /// button is down and the counter moved.
    ///
    /// The first reading for an address only sets a baseline. A counter change
    /// while the button reads released still moves the baseline without
    /// emitting anything.
    pub fn process(
        &mut self,
        address: MacAddress,
        button: ButtonState,
    ) -> Result<Option<u8>, TelemetryError> {
        if button.pressed > 1 {
            return Err(TelemetryError::InvalidPressed(button.pressed));
        }
        let expected = button.expected_checksum();
        if button.checksum != expected {
            return Err(TelemetryError::ChecksumMismatch {
                expected,
                actual: button.checksum,
            });
        }

        let Some(last) = self.last_counter.insert(address, button.counter) else {
            return Ok(None);
        };
        if last == button.counter || button.pressed == 0 {
            return Ok(None);
        }
        Ok(Some(button.counter.wrapping_sub(last)))
    }

    #[cfg(test)]
    pub fn last_counter(&self, address: &MacAddress) -> Option<u8> {
        self.last_counter.get(address).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn puck() -> MacAddress {
        "C0:98:E5:49:00:01".parse().unwrap()
    }

    fn button(pressed: u8, counter: u8) -> ButtonState {
        let mut state = ButtonState {
            pressed,
            counter,
            checksum: 0,
        };
        state.checksum = state.expected_checksum();
        state
    }

    #[test]
    fn test_first_reading_is_baseline() {
        let mut debouncer = ButtonDebouncer::new();
        assert_eq!(debouncer.process(puck(), button(1, 10)), Ok(None));
        assert_eq!(debouncer.last_counter(&puck()), Some(10));

        let mut debouncer = ButtonDebouncer::new();
        assert_eq!(debouncer.process(puck(), button(0, 10)), Ok(None));
    }

    #[test]
    fn test_press_emits_delta() {
        let mut debouncer = ButtonDebouncer::new();
        debouncer.process(puck(), button(0, 10)).unwrap();
        assert_eq!(debouncer.process(puck(), button(1, 11)), Ok(Some(1)));
        assert_eq!(debouncer.last_counter(&puck()), Some(11));
    }

    #[test]
    fn test_repeat_advertisement_is_ignored() {
        let mut debouncer = ButtonDebouncer::new();
        debouncer.process(puck(), button(0, 10)).unwrap();
        assert_eq!(debouncer.process(puck(), button(1, 11)), Ok(Some(1)));
        assert_eq!(debouncer.process(puck(), button(1, 11)), Ok(None));
        assert_eq!(debouncer.process(puck(), button(1, 11)), Ok(None));
    }

    #[test]
    fn test_wraparound_delta() {
        let mut debouncer = ButtonDebouncer::new();
        debouncer.process(puck(), button(0, 250)).unwrap();
        assert_eq!(debouncer.process(puck(), button(1, 2)), Ok(Some(8)));

        let mut debouncer = ButtonDebouncer::new();
        debouncer.process(puck(), button(0, 250)).unwrap();
        assert_eq!(debouncer.process(puck(), button(1, 3)), Ok(Some(9)));
    }

    #[test]
    fn test_release_moves_baseline_silently() {
        let mut debouncer = ButtonDebouncer::new();
        debouncer.process(puck(), button(0, 10)).unwrap();
        assert_eq!(debouncer.process(puck(), button(0, 12)), Ok(None));
        assert_eq!(debouncer.last_counter(&puck()), Some(12));
        assert_eq!(debouncer.process(puck(), button(1, 13)), Ok(Some(1)));
    }

    #[test]
    fn test_bad_checksum_leaves_history() {
        let mut debouncer = ButtonDebouncer::new();
        debouncer.process(puck(), button(0, 10)).unwrap();

        let mut forged = button(1, 20);
        forged.checksum = forged.checksum.wrapping_add(1);
        assert_eq!(
            debouncer.process(puck(), forged),
            Err(TelemetryError::ChecksumMismatch {
                expected: forged.expected_checksum(),
                actual: forged.checksum,
            })
        );
        assert_eq!(debouncer.last_counter(&puck()), Some(10));
    }

    #[test]
    fn test_bad_checksum_does_not_set_baseline() {
        let mut debouncer = ButtonDebouncer::new();
        let mut forged = button(1, 20);
        forged.checksum ^= 0xff;
        assert!(debouncer.process(puck(), forged).is_err());
        assert_eq!(debouncer.last_counter(&puck()), None);
    }

    #[test]
    fn test_invalid_pressed_leaves_history() {
        let mut debouncer = ButtonDebouncer::new();
        debouncer.process(puck(), button(0, 10)).unwrap();
        assert_eq!(
            debouncer.process(puck(), button(2, 30)),
            Err(TelemetryError::InvalidPressed(2))
        );
        assert_eq!(debouncer.last_counter(&puck()), Some(10));
    }

    #[test]
    fn test_addresses_are_independent() {
        let other: MacAddress = "C0:98:E5:49:00:02".parse().unwrap();
        let mut debouncer = ButtonDebouncer::new();
        debouncer.process(puck(), button(0, 10)).unwrap();
        assert_eq!(debouncer.process(other, button(1, 11)), Ok(None));
        assert_eq!(debouncer.process(puck(), button(1, 11)), Ok(Some(1)));
    }
}
