//! TMF882x host interface: register map, command codes, frame builders and
//! status decoders.
//!
//! Pure functions with no I/O; the driver in [`crate::device`] owns the bus.

use core::ops::Range;

// --- Registers ---
pub const REG_APPID: u8 = 0x00;
pub const REG_MINOR: u8 = 0x01;
pub const REG_CALIBRATION_STATUS: u8 = 0x07;
pub const REG_CMD_STAT: u8 = 0x08;
pub const REG_SERIAL_NUMBER: u8 = 0x1C;
pub const REG_CONFIG_RESULT: u8 = 0x20;
pub const REG_ENABLE: u8 = 0xE0;
pub const REG_INT_STATUS: u8 = 0xE1;

// --- Config page fields (valid after CMD_LOAD_CONFIG_PAGE) ---
pub const REG_PERIOD_MS: u8 = 0x24;
pub const REG_KILO_ITERATIONS: u8 = 0x26;
pub const REG_CONFIDENCE_THRESHOLD: u8 = 0x30;
pub const REG_GPIO_0: u8 = 0x31;
pub const REG_GPIO_1: u8 = 0x32;
pub const REG_SPAD_MAP_ID: u8 = 0x34;
pub const REG_I2C_SLAVE_ADDRESS: u8 = 0x3B;
pub const REG_I2C_ADDR_CHANGE: u8 = 0x3E;

// --- Calibration page (valid after CMD_LOAD_CALIBRATION_PAGE) ---
pub const REG_CALIBRATION_DATA: u8 = 0x24;

// --- Application commands ---
pub const CMD_MEASURE: u8 = 0x10;
pub const CMD_WRITE_CONFIG_PAGE: u8 = 0x15;
pub const CMD_LOAD_CONFIG_PAGE: u8 = 0x16;
pub const CMD_LOAD_CALIBRATION_PAGE: u8 = 0x19;
pub const CMD_FACTORY_CALIBRATION: u8 = 0x20;
pub const CMD_I2C_ADDRESS_CHANGE: u8 = 0x21;
pub const CMD_STOP: u8 = 0xFF;

// --- Bootloader commands ---
pub const BL_CMD_RAMREMAP_RESET: u8 = 0x11;
pub const BL_CMD_DOWNLOAD_INIT: u8 = 0x14;
pub const BL_CMD_W_RAM: u8 = 0x41;
pub const BL_CMD_SET_ADDR: u8 = 0x43;
pub const BL_DOWNLOAD_INIT_SEED: u8 = 0x29;
pub const BL_CHUNK_LEN: usize = 80;
pub const BL_STATUS_LEN: usize = 3;
pub const BL_STATUS_READY: u8 = 0x00;

// --- ENABLE register ---
pub const ENABLE_WAKEUP: u8 = 0x21;
pub const ENABLE_STANDBY: u8 = 0x20;
/// Bits 4 and 5 of ENABLE are not part of the mode.
pub const MODE_MASK: u8 = 0xCF;
pub const MODE_READY: u8 = 0x41;
pub const MODE_STANDBY: u8 = 0x02;

// --- APPID values ---
pub const APP_ID_APPLICATION: u8 = 0x03;
pub const APP_ID_BOOTLOADER: u8 = 0x80;

// --- INT_STATUS ---
pub const INT_RESULT: u8 = 0b10;
pub const INT_CLEAR_ALL: u8 = 0xFF;

// --- CMD_STAT values ---
pub const STATUS_OK: u8 = 0x00;
pub const STATUS_ACCEPTED: u8 = 0x01;
pub const STATUS_BUSY_MIN: u8 = 0x10;

// --- Pages ---
pub const PAGE_HEADER_LEN: usize = 4;
pub const PAGE_ID_RESULT: u8 = 0x10;
pub const PAGE_ID_CONFIG: u8 = CMD_LOAD_CONFIG_PAGE;
pub const PAGE_ID_CALIBRATION: u8 = CMD_LOAD_CALIBRATION_PAGE;
const PAGE_MAGIC: [u8; 2] = [0xBC, 0x00];

// --- Sizes ---
/// Largest single register transfer (SMBus block limit).
pub const MAX_TRANSFER_LEN: usize = 32;
pub const CALIBRATION_PAGE_LEN: usize = 192;
pub const CALIBRATION_DATA_LEN: usize = CALIBRATION_PAGE_LEN - PAGE_HEADER_LEN;
/// Iteration count (in units of 1024) used for factory calibration.
pub const CALIBRATION_KILO_ITERATIONS: u16 = 4000;

// --- Addressing ---
pub const DEFAULT_ADDRESS: u8 = 0x41;
pub const MIN_I2C_ADDRESS: u8 = 0x08;
pub const MAX_I2C_ADDRESS: u8 = 0x7F;

/// Decoded value of the CMD_STAT register after a command was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// The command is still executing.
    Busy,
    /// The command completed (`0x00`) or was accepted (`0x01`).
    Done,
    /// The device refused the command with this status byte.
    Rejected(u8),
}

/// Classify a CMD_STAT byte.
pub fn decode_status(status: u8) -> CommandStatus {
    match status {
        STATUS_OK | STATUS_ACCEPTED => CommandStatus::Done,
        s if s >= STATUS_BUSY_MIN => CommandStatus::Busy,
        s => CommandStatus::Rejected(s),
    }
}

/// Strip the non-mode bits from an ENABLE register value.
pub fn decode_mode(enable: u8) -> u8 {
    enable & MODE_MASK
}

/// True if the INT_STATUS value flags a pending measurement result.
pub fn result_ready(int_status: u8) -> bool {
    int_status & INT_RESULT != 0
}

/// Check the 4-byte header at 0x20 after a page load command.
///
/// Layout: `[page_id, _, 0xBC, 0x00]`.
pub fn page_loaded(header: &[u8], page_id: u8) -> bool {
    header.len() >= PAGE_HEADER_LEN && header[0] == page_id && header[2..4] == PAGE_MAGIC
}

/// Build a register write: register address followed by the payload.
pub fn build_register_write(register: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(data.len() + 1);
    frame.push(register);
    frame.extend_from_slice(data);
    frame
}

/// Split a block transfer of `len` bytes starting at `register` into
/// consecutive transfers no larger than [`MAX_TRANSFER_LEN`].
///
/// Yields the register of each chunk and its byte range within the block.
pub fn transfer_chunks(register: u8, len: usize) -> impl Iterator<Item = (u8, Range<usize>)> {
    (0..len).step_by(MAX_TRANSFER_LEN).map(move |start| {
        let end = (start + MAX_TRANSFER_LEN).min(len);
        (register.wrapping_add(start as u8), start..end)
    })
}

/// Build a bootloader command frame, including the CMD_STAT register byte.
///
/// Layout: `[0x08, cmd, len, data..., checksum]`, checksum over `cmd..data`.
pub fn build_bootloader_command(command: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(data.len() + 4);
    frame.push(REG_CMD_STAT);
    frame.push(command);
    frame.push(data.len() as u8);
    frame.extend_from_slice(data);
    let checksum = checksum8(&frame[1..]);
    frame.push(checksum);
    frame
}

/// Ones-complement 8-bit checksum used by bootloader frames.
pub fn checksum8(data: &[u8]) -> u8 {
    let sum: u8 = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    !sum
}

/// The I2C_SLAVE_ADDRESS field stores the 7-bit address shifted left by one.
pub fn encode_i2c_address(address: u8) -> u8 {
    address << 1
}

/// Inverse of [`encode_i2c_address`].
pub fn decode_i2c_address(raw: u8) -> u8 {
    raw >> 1
}

/// Addresses the config page accepts, 0x08..=0x7F.
pub fn valid_i2c_address(address: u8) -> bool {
    (MIN_I2C_ADDRESS..=MAX_I2C_ADDRESS).contains(&address)
}
