use mac_address::MacAddress;

/// A debounced button press, handed from the scan loop to the toggle
/// dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PressEvent {
    pub address: MacAddress,
    /// Presses counted since the previous advertisement.
    pub presses: u8,
}
