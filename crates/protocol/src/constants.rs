//! Protocol constants shared across the codec layers.

/// Frame start byte.
pub const STX: u8 = 0x02;

/// Frame end byte.
pub const ETX: u8 = 0x03;

/// Total size of a frame with empty data: header (15) + BCC (2) + ETX (1).
pub const MIN_FRAME_LEN: usize = 18;

/// Offset of the first data byte within a frame.
pub const DATA_OFFSET: usize = 15;

/// Offset of the destination address block (start of the BCC range).
pub const ADDR_OFFSET: usize = 3;

/// Source address the gateway stamps on every outgoing frame.
pub const HOST_ADDR: [u8; 5] = [0x13, 0x00, 0x00, 0x00, 0x00];

/// Highest accepted brightness / color-temperature value.
pub const MAX_LEVEL: u8 = 100;

/// Valid lamp numbers are `1..=MAX_LAMP_NO`.
pub const MAX_LAMP_NO: u8 = 64;
