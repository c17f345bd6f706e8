//! Serial line parameters.
//!
//! A [`SerialPortParameters`] value is an immutable snapshot handed to a port
//! when it is opened. Reconfiguring a port means closing and reopening it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

/// Parameters applied to a serial port at open time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialPortParameters {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits per character.
    pub data_bits: DataBits,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// Flow control flags.
    pub flow_control: FlowControl,

    /// Size of the engine read buffer and of each polling read, in bytes.
    pub read_buffer_size: usize,

    /// Size of the engine write buffer, in bytes.
    pub write_buffer_size: usize,

    /// Bulk read timeout in milliseconds.
    pub read_timeout_ms: u64,

    /// Bulk write timeout in milliseconds.
    pub write_timeout_ms: u64,

    /// Line delimiter used by line framing.
    pub new_line: String,

    /// Text encoding used by line framing and text writes.
    pub text_encoding: TextEncoding,
}

impl Default for SerialPortParameters {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::NONE,
            read_buffer_size: 16 * 1024,
            write_buffer_size: 16 * 1024,
            read_timeout_ms: 10,
            write_timeout_ms: 10,
            new_line: "\n".to_string(),
            text_encoding: TextEncoding::Utf8,
        }
    }
}

impl SerialPortParameters {
    /// Default parameters with the given baud rate.
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Default::default()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// The newline delimiter encoded with the configured text encoding.
    pub fn new_line_bytes(&self) -> Vec<u8> {
        self.text_encoding.encode(&self.new_line)
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    /// The bit count as sent on the wire by CDC-style line coding.
    pub fn bits(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = crate::SerialError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(crate::SerialError::unsupported(format!(
                "data bits must be 5..=8, got {other}"
            ))),
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
    NotSet,
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

/// Flow control flags. Several may be combined.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowControl(u8);

impl FlowControl {
    pub const NONE: FlowControl = FlowControl(0);
    pub const RTS_CTS_IN: FlowControl = FlowControl(0x01);
    pub const RTS_CTS_OUT: FlowControl = FlowControl(0x02);
    pub const XON_XOFF_IN: FlowControl = FlowControl(0x04);
    pub const XON_XOFF_OUT: FlowControl = FlowControl(0x08);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: FlowControl) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if either RTS/CTS direction is requested.
    pub fn uses_hardware(self) -> bool {
        self.0 & (Self::RTS_CTS_IN.0 | Self::RTS_CTS_OUT.0) != 0
    }

    /// True if either XON/XOFF direction is requested.
    pub fn uses_software(self) -> bool {
        self.0 & (Self::XON_XOFF_IN.0 | Self::XON_XOFF_OUT.0) != 0
    }
}

impl BitOr for FlowControl {
    type Output = FlowControl;

    fn bitor(self, rhs: FlowControl) -> FlowControl {
        FlowControl(self.0 | rhs.0)
    }
}

impl BitOrAssign for FlowControl {
    fn bitor_assign(&mut self, rhs: FlowControl) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("FlowControl(NONE)");
        }
        let names = [
            (Self::RTS_CTS_IN, "RTS_CTS_IN"),
            (Self::RTS_CTS_OUT, "RTS_CTS_OUT"),
            (Self::XON_XOFF_IN, "XON_XOFF_IN"),
            (Self::XON_XOFF_OUT, "XON_XOFF_OUT"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "FlowControl({})", set.join(" | "))
    }
}

/// Text encoding used when framing bytes into strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// UTF-8; invalid sequences decode to U+FFFD.
    #[default]
    Utf8,
    /// 7-bit ASCII; anything else becomes `?`.
    Ascii,
    /// ISO-8859-1, one byte per char.
    Latin1,
}

impl TextEncoding {
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '?' })
                .collect(),
            TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }

    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }
}
