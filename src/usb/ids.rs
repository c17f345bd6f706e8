//! Vendor and product ids of supported bridge chips and boards.

pub const VENDOR_FTDI: u16 = 0x0403;
pub const FTDI_FT232R: u16 = 0x6001;
pub const FTDI_FT2232H: u16 = 0x6010;
pub const FTDI_FT4232H: u16 = 0x6011;
pub const FTDI_FT232H: u16 = 0x6014;
pub const FTDI_FT231X: u16 = 0x6015;

pub const VENDOR_ATMEL: u16 = 0x03eb;
pub const ATMEL_LUFA_CDC_DEMO_APP: u16 = 0x2044;

pub const VENDOR_ARDUINO: u16 = 0x2341;
pub const ARDUINO_UNO: u16 = 0x0001;
pub const ARDUINO_MEGA_2560: u16 = 0x0010;
pub const ARDUINO_SERIAL_ADAPTER: u16 = 0x003b;
pub const ARDUINO_MEGA_ADK: u16 = 0x003f;
pub const ARDUINO_MEGA_2560_R3: u16 = 0x0042;
pub const ARDUINO_UNO_R3: u16 = 0x0043;
pub const ARDUINO_MEGA_ADK_R3: u16 = 0x0044;
pub const ARDUINO_LEONARDO: u16 = 0x8036;
pub const ARDUINO_MICRO: u16 = 0x8037;

pub const VENDOR_VAN_OOIJEN_TECH: u16 = 0x16c0;
pub const VAN_OOIJEN_TECH_TEENSYDUINO_SERIAL: u16 = 0x0483;

pub const VENDOR_LEAFLABS: u16 = 0x1eaf;
pub const LEAFLABS_MAPLE: u16 = 0x0004;

pub const VENDOR_ELATEC: u16 = 0x09d8;
pub const ELATEC_TWN3_CDC: u16 = 0x0320;
pub const ELATEC_TWN4_MIFARE_NFC: u16 = 0x0406;
pub const ELATEC_TWN4_CDC: u16 = 0x0420;

pub const VENDOR_SILABS: u16 = 0x10c4;
pub const SILABS_CP2102: u16 = 0xea60;
pub const SILABS_CP2105: u16 = 0xea70;
pub const SILABS_CP2108: u16 = 0xea71;
pub const SILABS_CP2110: u16 = 0xea80;

pub const VENDOR_PROLIFIC: u16 = 0x067b;
pub const PROLIFIC_PL2303: u16 = 0x2303;
pub const PROLIFIC_PL2303GC: u16 = 0x23a3;
pub const PROLIFIC_PL2303GB: u16 = 0x23b3;
pub const PROLIFIC_PL2303GT: u16 = 0x23c3;
pub const PROLIFIC_PL2303GL: u16 = 0x23d3;
pub const PROLIFIC_PL2303GE: u16 = 0x23e3;
pub const PROLIFIC_PL2303GS: u16 = 0x23f3;

pub const VENDOR_QINHENG: u16 = 0x1a86;
pub const QINHENG_HL340: u16 = 0x7523;

pub const VENDOR_STM: u16 = 0x0483;
pub const STM_VCOM: u16 = 0x5740;
pub const STM_STLINK_V2_1: u16 = 0x374b;
