//! Register-level model of a TMF882x for the integration tests.
//!
//! Implements just enough of the host interface to drive the whole driver:
//! power states, the command register, config/calibration/result pages,
//! measurement generation with the confidence threshold applied, factory
//! calibration, the I2C address change and the bootloader upload path.
//! Knobs on the struct inject the failure modes.

#![allow(dead_code)]

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

pub const FIRMWARE: &[u8] = &[0x5A; 200];
pub const SERIAL_NUMBER: u32 = 0x0042_1337;
pub const APP_MINOR: u8 = 0x1A;

const PAGE_BASE: usize = 0x20;
const PAGE_END: usize = 0xE0;
const PAGE_LAST: usize = PAGE_END - 1;
const CALIBRATION_LEN: usize = 188;
const CHANNELS: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    None,
    Config,
    Calibration,
    Result,
}

pub struct FakeTmf882x {
    /// 7-bit address the device answers at.
    pub address: u8,
    /// Committed config page, indexed by register.
    pub config: [u8; 256],
    /// Calibration data in RAM and the SPAD map active when it was committed.
    pub calibration: Option<(u8, Vec<u8>)>,
    /// `(confidence, distance_mm)` per result channel before thresholding.
    pub primary: [(u8, u16); CHANNELS],
    pub secondary: [(u8, u16); CHANNELS],

    // -- Knobs --
    /// Boot into the bootloader until an image was uploaded.
    pub bootloader: bool,
    /// Reject this command with this status.
    pub reject: Option<(u8, u8)>,
    /// Register whose committed value never changes.
    pub sticky: Option<u8>,
    /// CMD_STAT reads that report busy after each command.
    pub busy_reads: u32,
    /// The application never reports ready after a wakeup.
    pub never_ready: bool,
    /// MEASURE is accepted but no result is ever produced.
    pub stall_measurements: bool,
    /// Every result carries the same result number.
    pub freeze_result_number: bool,
    /// Fail every bus transaction.
    pub fail_bus: bool,

    // -- Observations --
    pub commands: Vec<u8>,
    pub transfers: usize,
    pub uploaded: Vec<u8>,
    /// Kilo-iterations in effect when factory calibration ran.
    pub calibration_kilo_iterations: Option<u16>,

    powered: bool,
    wakeup_requested: bool,
    page: Page,
    window: [u8; PAGE_END - PAGE_BASE],
    cmd_stat: u8,
    last_command: u8,
    busy_left: u32,
    int_status: u8,
    result_number: u8,
    bl_status: u8,
    pending_address: Option<u8>,
    pointer: u8,
}

impl Default for FakeTmf882x {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTmf882x {
    pub fn new() -> Self {
        let mut primary = [(0u8, 0u16); CHANNELS];
        let mut secondary = [(0u8, 0u16); CHANNELS];
        for c in 0..CHANNELS {
            primary[c] = (100 + c as u8, 500 + 10 * c as u16);
            secondary[c] = (40, 1500 + 10 * c as u16);
        }
        Self {
            address: 0x41,
            config: default_config(),
            calibration: None,
            primary,
            secondary,
            bootloader: false,
            reject: None,
            sticky: None,
            busy_reads: 0,
            never_ready: false,
            stall_measurements: false,
            freeze_result_number: false,
            fail_bus: false,
            commands: Vec::new(),
            transfers: 0,
            uploaded: Vec::new(),
            calibration_kilo_iterations: None,
            powered: false,
            wakeup_requested: false,
            page: Page::None,
            window: [0; PAGE_END - PAGE_BASE],
            cmd_stat: 0,
            last_command: 0,
            busy_left: 0,
            int_status: 0,
            result_number: 0,
            bl_status: 0,
            pending_address: None,
            pointer: 0,
        }
    }

    /// Lose everything held in RAM: configuration, calibration, power state.
    pub fn power_cycle(&mut self) {
        self.config = default_config();
        self.calibration = None;
        self.powered = false;
        self.wakeup_requested = false;
        self.page = Page::None;
        self.int_status = 0;
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn spad_map_id(&self) -> u8 {
        self.config[0x34]
    }

    pub fn kilo_iterations(&self) -> u16 {
        u16::from_le_bytes([self.config[0x26], self.config[0x27]])
    }

    fn write(&mut self, bytes: &[u8]) {
        let Some((&register, data)) = bytes.split_first() else {
            return;
        };
        self.pointer = register;
        if self.bootloader && register == 0x08 && data.len() >= 2 {
            self.bootloader_command(data);
            return;
        }
        for (i, &value) in data.iter().enumerate() {
            self.write_register(register.wrapping_add(i as u8), value);
        }
    }

    fn read(&mut self, buf: &mut [u8]) {
        let register = self.pointer;
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.read_register(register.wrapping_add(i as u8));
        }
    }

    fn write_register(&mut self, register: u8, value: u8) {
        match register as usize {
            0xE0 => {
                if value & 0x01 != 0 {
                    self.wakeup_requested = true;
                    self.powered = !self.never_ready;
                } else {
                    self.wakeup_requested = false;
                    self.powered = false;
                    self.page = Page::None;
                }
            }
            0xE1 => self.int_status &= !value,
            0x08 => self.command(value),
            r @ PAGE_BASE..=PAGE_LAST if self.page != Page::None => {
                self.window[r - PAGE_BASE] = value;
            }
            _ => {}
        }
    }

    fn read_register(&mut self, register: u8) -> u8 {
        match register as usize {
            0x00 if self.bootloader => 0x80,
            0x00 => 0x03,
            0x01 => APP_MINOR,
            0x07 => match &self.calibration {
                Some((map, _)) if *map == self.spad_map_id() => 0x00,
                _ => 0x31,
            },
            0x08 if self.bootloader => self.bl_status,
            0x09 if self.bootloader => 0x00,
            0x0A if self.bootloader => !self.bl_status,
            0x08 => {
                if self.busy_left > 0 {
                    self.busy_left -= 1;
                    return self.last_command;
                }
                if let Some(address) = self.pending_address.take() {
                    self.address = address;
                }
                self.cmd_stat
            }
            r @ 0x1C..=0x1F => SERIAL_NUMBER.to_le_bytes()[r - 0x1C],
            r @ PAGE_BASE..=PAGE_LAST if self.page != Page::None => self.window[r - PAGE_BASE],
            0xE0 if self.powered => 0x41,
            0xE0 if self.wakeup_requested => 0x01,
            0xE0 => 0x02,
            0xE1 => self.int_status,
            _ => 0x00,
        }
    }

    fn command(&mut self, command: u8) {
        self.commands.push(command);
        self.last_command = command;
        self.busy_left = self.busy_reads;
        if let Some((rejected, status)) = self.reject {
            if rejected == command {
                self.cmd_stat = status;
                return;
            }
        }
        self.cmd_stat = 0x00;
        match command {
            0x10 => self.measure(),
            0x15 => self.commit_page(),
            0x16 => {
                self.page = Page::Config;
                self.window.copy_from_slice(&self.config[PAGE_BASE..PAGE_END]);
                self.window[..4].copy_from_slice(&[0x16, 0x00, 0xBC, 0x00]);
            }
            0x19 => {
                self.page = Page::Calibration;
                self.window.fill(0);
                self.window[..4].copy_from_slice(&[0x19, 0x00, 0xBC, 0x00]);
                if let Some((_, data)) = &self.calibration {
                    self.window[4..4 + CALIBRATION_LEN].copy_from_slice(data);
                }
            }
            0x20 => {
                let map = self.spad_map_id();
                self.calibration_kilo_iterations = Some(self.kilo_iterations());
                let data = (0..CALIBRATION_LEN)
                    .map(|i| (i as u8).wrapping_mul(31) ^ map)
                    .collect();
                self.calibration = Some((map, data));
            }
            0x21 => self.pending_address = Some(self.config[0x3B] >> 1),
            0xFF => {}
            _ => self.cmd_stat = 0x02,
        }
    }

    fn commit_page(&mut self) {
        match self.page {
            Page::Config => {
                for register in PAGE_BASE + 4..PAGE_END {
                    if self.sticky != Some(register as u8) {
                        self.config[register] = self.window[register - PAGE_BASE];
                    }
                }
            }
            Page::Calibration => {
                let data = self.window[4..4 + CALIBRATION_LEN].to_vec();
                self.calibration = Some((self.spad_map_id(), data));
            }
            _ => {}
        }
    }

    fn measure(&mut self) {
        if self.stall_measurements {
            return;
        }
        if !self.freeze_result_number {
            self.result_number = self.result_number.wrapping_add(1);
        }
        let threshold = self.config[0x30];
        let map = self.spad_map_id();

        let mut frame = [0u8; 132];
        frame[..4].copy_from_slice(&[0x10, self.result_number, 128, 0]);
        frame[4] = self.result_number;
        frame[5] = 25;
        frame[8..12].copy_from_slice(&1_000u32.to_le_bytes());
        frame[12..16].copy_from_slice(&50_000u32.to_le_bytes());
        frame[16..20].copy_from_slice(&20_000u32.to_le_bytes());
        frame[20..24].copy_from_slice(&(self.result_number as u32 * 33).to_le_bytes());

        let mut valid = 0;
        for c in 0..CHANNELS {
            // Channel 8 separates the two halves of a 4x4 map.
            let unused = matches!(map, 4 | 7) && c == 8;
            for (slot, (confidence, distance)) in
                [(c, self.primary[c]), (c + CHANNELS, self.secondary[c])]
            {
                let (confidence, distance) = if unused || confidence < threshold {
                    (0, 0)
                } else {
                    (confidence, distance)
                };
                if slot < CHANNELS && confidence > 0 {
                    valid += 1;
                }
                let at = 24 + slot * 3;
                frame[at] = confidence;
                frame[at + 1..at + 3].copy_from_slice(&distance.to_le_bytes());
            }
        }
        frame[6] = valid;

        self.page = Page::Result;
        self.window[..frame.len()].copy_from_slice(&frame);
        self.int_status |= 0x02;
    }

    /// `data` is `[cmd, len, payload..., checksum]`.
    fn bootloader_command(&mut self, data: &[u8]) {
        let (command, len) = (data[0], data[1] as usize);
        let Some(payload) = data.get(2..2 + len) else {
            self.bl_status = 0x03;
            return;
        };
        let sum = data[..2 + len].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        if data.get(2 + len) != Some(&!sum) {
            self.bl_status = 0x03;
            return;
        }
        self.bl_status = 0x00;
        match command {
            0x14 => self.uploaded.clear(),
            0x43 => {}
            0x41 => self.uploaded.extend_from_slice(payload),
            0x11 if !self.uploaded.is_empty() => self.bootloader = false,
            _ => self.bl_status = 0x02,
        }
    }
}

fn default_config() -> [u8; 256] {
    let mut config = [0u8; 256];
    config[0x24..0x26].copy_from_slice(&33u16.to_le_bytes());
    config[0x26..0x28].copy_from_slice(&537u16.to_le_bytes());
    config[0x30] = 6;
    config[0x34] = 1;
    config[0x3B] = 0x41 << 1;
    config
}

impl ErrorType for FakeTmf882x {
    type Error = ErrorKind;
}

impl I2c for FakeTmf882x {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.fail_bus {
            return Err(ErrorKind::Bus);
        }
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        self.transfers += 1;
        for operation in operations {
            match operation {
                Operation::Write(bytes) => self.write(*bytes),
                Operation::Read(buf) => self.read(&mut buf[..]),
            }
        }
        Ok(())
    }
}
