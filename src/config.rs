//! Configuration page access.
//!
//! Every access loads the config page and closes it again with
//! WRITE_CONFIG_PAGE, reads included. Setters validate locally, write, commit
//! and read the field back.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::device::Tmf882x;
use crate::protocol::*;
use crate::spad_map;
use crate::types::{Configuration, DeviceState};
use crate::{Result, Tmf882xError};

/// Settle time around an I2C address change.
const ADDRESS_CHANGE_SETTLE_MS: u32 = 100;
const ADDRESS_RANGE: &str = "7-bit address must be within 0x08..=0x7F";

/// A field of the config page.
#[derive(Debug, Clone, Copy)]
struct Field {
    name: &'static str,
    register: u8,
    /// Little-endian width in bytes, 1 or 2.
    width: usize,
}

const PERIOD: Field = Field {
    name: "measurement_period_ms",
    register: REG_PERIOD_MS,
    width: 2,
};
const KILO_ITERATIONS: Field = Field {
    name: "kilo_iterations",
    register: REG_KILO_ITERATIONS,
    width: 2,
};
const CONFIDENCE_THRESHOLD: Field = Field {
    name: "confidence_threshold",
    register: REG_CONFIDENCE_THRESHOLD,
    width: 1,
};
const SPAD_MAP_ID: Field = Field {
    name: "spad_map_id",
    register: REG_SPAD_MAP_ID,
    width: 1,
};
const GPIO_0: Field = Field {
    name: "gpio_0",
    register: REG_GPIO_0,
    width: 1,
};
const GPIO_1: Field = Field {
    name: "gpio_1",
    register: REG_GPIO_1,
    width: 1,
};
const I2C_ADDRESS: Field = Field {
    name: "i2c_address",
    register: REG_I2C_SLAVE_ADDRESS,
    width: 1,
};
const I2C_ADDRESS_CHANGE: Field = Field {
    name: "i2c_address_change",
    register: REG_I2C_ADDR_CHANGE,
    width: 1,
};

impl<I2C: I2c, D: DelayNs> Tmf882x<I2C, D> {
    // --- Measurement settings ---

    /// Repetition period in milliseconds.
    pub fn measurement_period_ms(&mut self) -> Result<u16, I2C::Error> {
        Ok(self.get(PERIOD)? as u16)
    }

    /// Repetition period in milliseconds; must be at least 1.
    pub fn set_measurement_period_ms(&mut self, period_ms: u16) -> Result<(), I2C::Error> {
        self.state.require(PERIOD.name, DeviceState::Enabled)?;
        if period_ms == 0 {
            return Err(invalid(PERIOD, 0, "must be at least 1 ms"));
        }
        self.update(PERIOD, period_ms as u32)
    }

    /// Iterations per measurement in units of 1024.
    pub fn kilo_iterations(&mut self) -> Result<u16, I2C::Error> {
        Ok(self.get(KILO_ITERATIONS)? as u16)
    }

    /// Iterations per measurement in units of 1024; must be at least 1.
    pub fn set_kilo_iterations(&mut self, kilo_iterations: u16) -> Result<(), I2C::Error> {
        self.state.require(KILO_ITERATIONS.name, DeviceState::Enabled)?;
        if kilo_iterations == 0 {
            return Err(invalid(KILO_ITERATIONS, 0, "must be at least 1"));
        }
        self.update(KILO_ITERATIONS, kilo_iterations as u32)
    }

    /// Minimum confidence for a target to be reported.
    pub fn confidence_threshold(&mut self) -> Result<u8, I2C::Error> {
        Ok(self.get(CONFIDENCE_THRESHOLD)? as u8)
    }

    pub fn set_confidence_threshold(&mut self, threshold: u8) -> Result<(), I2C::Error> {
        self.state.require(CONFIDENCE_THRESHOLD.name, DeviceState::Enabled)?;
        self.update(CONFIDENCE_THRESHOLD, threshold as u32)
    }

    /// Active SPAD map as reported by the device.
    pub fn spad_map_id(&mut self) -> Result<u8, I2C::Error> {
        Ok(self.get(SPAD_MAP_ID)? as u8)
    }

    /// Select a pre-programmed SPAD map.
    ///
    /// The id must exist and be supported by the configured chip variant.
    /// Calibration data captured under another map no longer applies; a
    /// warning is logged when that happens.
    pub fn set_spad_map_id(&mut self, id: u8) -> Result<(), I2C::Error> {
        self.state.require(SPAD_MAP_ID.name, DeviceState::Enabled)?;
        let Some(map) = spad_map::lookup(id) else {
            return Err(invalid(SPAD_MAP_ID, id as u32, "unknown SPAD map"));
        };
        if !map.supported_by(self.config.variant) {
            return Err(invalid(
                SPAD_MAP_ID,
                id as u32,
                "not supported by the configured chip variant",
            ));
        }
        self.update(SPAD_MAP_ID, id as u32)?;
        self.check_calibration_context(id);
        Ok(())
    }

    // --- GPIO ---

    /// Raw GPIO0 mode byte.
    pub fn gpio_0(&mut self) -> Result<u8, I2C::Error> {
        Ok(self.get(GPIO_0)? as u8)
    }

    /// Raw GPIO0 mode byte.
    pub fn set_gpio_0(&mut self, mode: u8) -> Result<(), I2C::Error> {
        self.state.require(GPIO_0.name, DeviceState::Enabled)?;
        self.update(GPIO_0, mode as u32)
    }

    /// Raw GPIO1 mode byte.
    pub fn gpio_1(&mut self) -> Result<u8, I2C::Error> {
        Ok(self.get(GPIO_1)? as u8)
    }

    /// Raw GPIO1 mode byte.
    pub fn set_gpio_1(&mut self, mode: u8) -> Result<(), I2C::Error> {
        self.state.require(GPIO_1.name, DeviceState::Enabled)?;
        self.update(GPIO_1, mode as u32)
    }

    // --- Addressing ---

    /// 7-bit address stored in the config page.
    ///
    /// Differs from [`address`](Self::address) only between a
    /// [`set_i2c_address`](Self::set_i2c_address) and the address change
    /// command.
    pub fn i2c_address(&mut self) -> Result<u8, I2C::Error> {
        Ok(decode_i2c_address(self.get(I2C_ADDRESS)? as u8))
    }

    /// Store a new address in the config page without switching to it.
    pub fn set_i2c_address(&mut self, address: u8) -> Result<(), I2C::Error> {
        self.state.require(I2C_ADDRESS.name, DeviceState::Enabled)?;
        if !valid_i2c_address(address) {
            return Err(invalid(I2C_ADDRESS, address as u32, ADDRESS_RANGE));
        }
        self.update(I2C_ADDRESS, encode_i2c_address(address) as u32)
    }

    /// Move the device to a new 7-bit address and follow it there.
    pub fn change_i2c_address(&mut self, address: u8) -> Result<(), I2C::Error> {
        self.state.require("change_i2c_address", DeviceState::Enabled)?;
        if !valid_i2c_address(address) {
            return Err(invalid(I2C_ADDRESS, address as u32, ADDRESS_RANGE));
        }
        self.update(I2C_ADDRESS, encode_i2c_address(address) as u32)?;
        // The change applies unconditionally, no GPIO qualification.
        self.update(I2C_ADDRESS_CHANGE, 0)?;

        self.delay.delay_ms(ADDRESS_CHANGE_SETTLE_MS);
        self.send_command(CMD_I2C_ADDRESS_CHANGE)?;
        self.delay.delay_ms(ADDRESS_CHANGE_SETTLE_MS);

        log::debug!("I2C address {:#04x} -> {address:#04x}", self.config.address);
        self.config.address = address;
        Ok(())
    }

    /// All measurement settings from one config page load.
    pub fn configuration(&mut self) -> Result<Configuration, I2C::Error> {
        self.state.require("configuration", DeviceState::Enabled)?;
        self.in_config_page(|dev| {
            Ok(Configuration {
                measurement_period_ms: dev.read_field(PERIOD)? as u16,
                kilo_iterations: dev.read_field(KILO_ITERATIONS)? as u16,
                confidence_threshold: dev.read_field(CONFIDENCE_THRESHOLD)? as u8,
                spad_map_id: dev.read_field(SPAD_MAP_ID)? as u8,
            })
        })
    }

    // --- Page handling ---

    /// Issue LOAD_CONFIG_PAGE and check the page header.
    fn load_config_page(&mut self) -> Result<(), I2C::Error> {
        self.load_page(CMD_LOAD_CONFIG_PAGE, PAGE_ID_CONFIG)
    }

    /// Issue a page load command and check that the page shows up at 0x20.
    pub(crate) fn load_page(&mut self, command: u8, page_id: u8) -> Result<(), I2C::Error> {
        self.send_command(command)?;
        let mut header = [0u8; PAGE_HEADER_LEN];
        self.read_register(REG_CONFIG_RESULT, &mut header)?;
        if !page_loaded(&header, page_id) {
            return Err(Tmf882xError::PageNotLoaded {
                page: page_id,
                header,
            });
        }
        Ok(())
    }

    /// Commit the loaded page with WRITE_CONFIG_PAGE.
    pub(crate) fn commit_page(&mut self) -> Result<(), I2C::Error> {
        self.send_command(CMD_WRITE_CONFIG_PAGE)
    }

    /// Run `f` between LOAD_CONFIG_PAGE and WRITE_CONFIG_PAGE.
    fn in_config_page<T, F>(&mut self, f: F) -> Result<T, I2C::Error>
    where
        F: FnOnce(&mut Self) -> Result<T, I2C::Error>,
    {
        self.load_config_page()?;
        let value = f(self)?;
        self.commit_page()?;
        Ok(value)
    }

    fn get(&mut self, field: Field) -> Result<u32, I2C::Error> {
        self.state.require(field.name, DeviceState::Enabled)?;
        self.in_config_page(|dev| dev.read_field(field))
    }

    /// Write one field, commit and verify the readback.
    fn update(&mut self, field: Field, value: u32) -> Result<(), I2C::Error> {
        self.in_config_page(|dev| {
            dev.write_register(field.register, &value.to_le_bytes()[..field.width])
        })?;

        let actual = self.in_config_page(|dev| dev.read_field(field))?;
        if actual != value {
            return Err(Tmf882xError::Verification {
                field: field.name,
                expected: value,
                actual,
            });
        }
        log::debug!("{} = {value}", field.name);
        Ok(())
    }

    fn read_field(&mut self, field: Field) -> Result<u32, I2C::Error> {
        let mut buf = [0u8; 4];
        self.read_register(field.register, &mut buf[..field.width])?;
        Ok(u32::from_le_bytes(buf))
    }
}

fn invalid<E>(field: Field, value: u32, reason: &'static str) -> Tmf882xError<E> {
    Tmf882xError::InvalidValue {
        field: field.name,
        value,
        reason,
    }
}
