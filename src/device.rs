//! High-level TMF882x device interface.

use core::ops::{Deref, DerefMut};

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::frame::{decode_measurement, Measurement, FRAME_LEN};
use crate::protocol::*;
use crate::spad_map;
use crate::state::StateMachine;
use crate::types::*;
use crate::{Result, Tmf882xError};

/// Driver for one TMF882x at one I2C address.
///
/// The driver owns the bus handle; all operations block until the device
/// answers or a poll budget from [`DriverConfig`] runs out.
///
/// ```no_run
/// # fn run<I2C: embedded_hal::i2c::I2c, D: embedded_hal::delay::DelayNs>(i2c: I2C, delay: D)
/// #     -> Result<(), tmf882x::Tmf882xError<I2C::Error>> {
/// use tmf882x::Tmf882x;
///
/// let mut tof = Tmf882x::new(i2c, delay);
/// tof.enable()?;
/// let m = tof.measure()?;
/// println!("#{} at {} °C: {:?}", m.result_number, m.temperature_c, m.primary_grid());
/// tof.standby()?;
/// # Ok(())
/// # }
/// ```
pub struct Tmf882x<I2C, D> {
    pub(crate) i2c: I2C,
    pub(crate) delay: D,
    pub(crate) config: DriverConfig,
    pub(crate) state: StateMachine,
    /// Result number of the last accepted frame since the last enable.
    pub(crate) last_result_number: Option<u8>,
    /// SPAD map of the last captured or uploaded calibration blob.
    pub(crate) calibration_map: Option<u8>,
}

impl<I2C: I2c, D: DelayNs> Tmf882x<I2C, D> {
    /// Create a driver at the default address (0x41).
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_config(i2c, delay, DriverConfig::default())
    }

    /// Create a driver with explicit address, variant, poll budgets and firmware.
    pub fn with_config(i2c: I2C, delay: D, config: DriverConfig) -> Self {
        Self {
            i2c,
            delay,
            config,
            state: StateMachine::new(),
            last_result_number: None,
            calibration_map: None,
        }
    }

    /// Local view of the device state.
    pub fn state(&self) -> DeviceState {
        self.state.state()
    }

    /// Current 7-bit I2C address.
    pub fn address(&self) -> u8 {
        self.config.address
    }

    /// Settings this driver was created with.
    pub fn driver_config(&self) -> &DriverConfig {
        &self.config
    }

    /// Give back the bus and delay.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    // --- Lifecycle ---

    /// Power up the device and wait for the application to run.
    ///
    /// Fails with [`Tmf882xError::InvalidState`] unless in standby. If the chip
    /// comes up in its bootloader, the configured firmware image is uploaded.
    pub fn enable(&mut self) -> Result<(), I2C::Error> {
        self.state.require("enable", DeviceState::Standby)?;
        self.write_register(REG_ENABLE, &[ENABLE_WAKEUP])?;
        let attempts = self.config.ready_polls;
        self.poll("enable", attempts, |dev| dev.mode(), |mode| mode == MODE_READY)?;

        let app_id = self.app_id()?;
        if app_id == APP_ID_BOOTLOADER {
            let Some(image) = self.config.firmware else {
                return Err(Tmf882xError::NoApplication { app_id });
            };
            self.load_firmware(image)?;
            let app_id = self.app_id()?;
            if app_id != APP_ID_APPLICATION {
                return Err(Tmf882xError::NoApplication { app_id });
            }
        }

        self.state.transition("enable", DeviceState::Enabled)?;
        self.last_result_number = None;
        Ok(())
    }

    /// Put the device in standby. Allowed from every state.
    ///
    /// The local state is standby afterwards even if the device does not
    /// acknowledge; only a bus failure is reported.
    pub fn standby(&mut self) -> Result<(), I2C::Error> {
        if self.state() == DeviceState::Measuring {
            if let Err(e) = self.stop() {
                log::warn!("stop before standby failed: {e:?}");
            }
        }
        let written = self.write_register(REG_ENABLE, &[ENABLE_STANDBY]);
        self.state.reset();
        self.last_result_number = None;
        written?;

        let attempts = self.config.ready_polls;
        match self.poll("standby", attempts, |dev| dev.mode(), |mode| mode == MODE_STANDBY) {
            Ok(_) => Ok(()),
            Err(Tmf882xError::Timeout { last_status, .. }) => {
                log::warn!("standby not acknowledged, mode {last_status:#04x}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Enable the device for the lifetime of the returned guard.
    ///
    /// The guard puts the device back in standby when dropped. If enabling
    /// fails after the bus was touched, standby is issued before returning.
    pub fn enabled(&mut self) -> Result<Enabled<'_, I2C, D>, I2C::Error> {
        match self.enable() {
            Ok(()) => Ok(Enabled { device: self }),
            Err(e @ Tmf882xError::InvalidState { .. }) => Err(e),
            Err(e) => {
                if let Err(standby) = self.standby() {
                    log::warn!("standby after failed enable: {standby:?}");
                }
                Err(e)
            }
        }
    }

    /// Run `f` with the device enabled; standby follows on every path.
    pub fn with_enabled<T, F>(&mut self, f: F) -> Result<T, I2C::Error>
    where
        F: FnOnce(&mut Self) -> Result<T, I2C::Error>,
    {
        let mut guard = self.enabled()?;
        f(&mut *guard)
    }

    // --- Measurement ---

    /// Run one measurement and decode the result.
    ///
    /// Blocks until the result interrupt fires or the poll budget runs out;
    /// the state is back at enabled afterwards either way.
    pub fn measure(&mut self) -> Result<Measurement, I2C::Error> {
        self.state.require("measure", DeviceState::Enabled)?;
        let map_id = self.spad_map_id()?;
        let Some(map) = spad_map::lookup(map_id) else {
            return Err(Tmf882xError::InvalidValue {
                field: "spad_map_id",
                value: map_id as u32,
                reason: "device reports an unknown SPAD map",
            });
        };
        self.check_calibration_context(map_id);

        self.state.transition("measure", DeviceState::Measuring)?;
        let outcome = self.run_measurement(map);
        if outcome.is_err() {
            if let Err(e) = self.stop() {
                log::warn!("stop after failed measurement: {e:?}");
            }
        }
        self.state.transition("measure", DeviceState::Enabled)?;
        outcome
    }

    fn run_measurement(&mut self, map: &spad_map::SpadMap) -> Result<Measurement, I2C::Error> {
        self.write_register(REG_INT_STATUS, &[INT_CLEAR_ALL])?;
        self.send_command(CMD_MEASURE)?;
        let attempts = self.config.measure_polls;
        self.poll(
            "measurement result",
            attempts,
            |dev| dev.read_u8(REG_INT_STATUS),
            result_ready,
        )?;
        let frame = self.read_block(REG_CONFIG_RESULT, FRAME_LEN)?;
        self.stop()?;
        let calibration_ok = self.read_u8(REG_CALIBRATION_STATUS)? == STATUS_OK;

        let measurement = decode_measurement(&frame, map, self.last_result_number, calibration_ok)?;
        log::debug!(
            "result #{} map {} ({} zones, calibration ok: {})",
            measurement.result_number,
            map.id,
            measurement.results.len(),
            calibration_ok
        );
        self.last_result_number = Some(measurement.result_number);
        Ok(measurement)
    }

    /// Stop a running measurement. The STOP command is not polled.
    fn stop(&mut self) -> Result<(), I2C::Error> {
        self.write_register(REG_CMD_STAT, &[CMD_STOP])
    }

    // --- Identification ---

    /// 0x03 when the application runs, 0x80 in the bootloader.
    pub fn app_id(&mut self) -> Result<u8, I2C::Error> {
        self.read_u8(REG_APPID)
    }

    /// Minor version of the running application.
    pub fn app_minor(&mut self) -> Result<u8, I2C::Error> {
        self.read_u8(REG_MINOR)
    }

    /// Chip serial number, little-endian at 0x1C.
    pub fn serial_number(&mut self) -> Result<u32, I2C::Error> {
        let mut buf = [0u8; 4];
        self.read_register(REG_SERIAL_NUMBER, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Mode bits of the ENABLE register.
    pub fn mode(&mut self) -> Result<u8, I2C::Error> {
        Ok(decode_mode(self.read_u8(REG_ENABLE)?))
    }

    // --- Bootloader ---

    fn load_firmware(&mut self, image: &[u8]) -> Result<(), I2C::Error> {
        log::debug!("bootloader: uploading {} byte application image", image.len());
        self.send_bootloader_command(BL_CMD_DOWNLOAD_INIT, &[BL_DOWNLOAD_INIT_SEED])?;
        self.send_bootloader_command(BL_CMD_SET_ADDR, &[0x00, 0x00])?;
        for chunk in image.chunks(BL_CHUNK_LEN) {
            self.send_bootloader_command(BL_CMD_W_RAM, chunk)?;
        }
        self.send_bootloader_command(BL_CMD_RAMREMAP_RESET, &[])?;
        self.delay.delay_ms(3);
        Ok(())
    }

    fn send_bootloader_command(&mut self, command: u8, data: &[u8]) -> Result<(), I2C::Error> {
        let frame = build_bootloader_command(command, data);
        self.i2c
            .write(self.config.address, &frame)
            .map_err(Tmf882xError::Transport)?;

        let attempts = self.config.command_polls;
        let status = self.poll(
            "bootloader command",
            attempts,
            |dev| dev.bootloader_status(),
            |s| s < STATUS_BUSY_MIN,
        )?;
        if status != BL_STATUS_READY {
            return Err(Tmf882xError::CommandRejected {
                command,
                status,
                state: self.state(),
            });
        }
        Ok(())
    }

    /// The bootloader answers `[status, size, checksum]` at CMD_STAT.
    fn bootloader_status(&mut self) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; BL_STATUS_LEN];
        self.read_register(REG_CMD_STAT, &mut buf)?;
        Ok(buf[0])
    }

    // --- Internal protocol handling ---

    /// Issue an application command and wait for it to leave the busy state.
    ///
    /// A failure status is terminal; only "busy" is retried.
    pub(crate) fn send_command(&mut self, command: u8) -> Result<(), I2C::Error> {
        log::debug!("command {command:#04x}");
        self.write_register(REG_CMD_STAT, &[command])?;
        let attempts = self.config.command_polls;
        let status = self.poll(
            "command completion",
            attempts,
            |dev| dev.read_u8(REG_CMD_STAT),
            |s| decode_status(s) != CommandStatus::Busy,
        )?;
        match decode_status(status) {
            CommandStatus::Rejected(status) => Err(Tmf882xError::CommandRejected {
                command,
                status,
                state: self.state(),
            }),
            _ => Ok(()),
        }
    }

    /// Read a register up to `attempts` times until `done` accepts its value.
    ///
    /// The register is read at least once.
    fn poll<R, F>(
        &mut self,
        operation: &'static str,
        attempts: u32,
        mut read: R,
        done: F,
    ) -> Result<u8, I2C::Error>
    where
        R: FnMut(&mut Self) -> Result<u8, I2C::Error>,
        F: Fn(u8) -> bool,
    {
        let attempts = attempts.max(1);
        let mut last = 0;
        for attempt in 0..attempts {
            if attempt > 0 {
                self.delay.delay_us(self.config.poll_interval_us);
            }
            last = read(self)?;
            if done(last) {
                return Ok(last);
            }
        }
        Err(Tmf882xError::Timeout {
            operation,
            attempts,
            state: self.state(),
            last_status: last,
        })
    }

    pub(crate) fn write_register(&mut self, register: u8, data: &[u8]) -> Result<(), I2C::Error> {
        log::trace!("write {register:#04x} <- {data:02x?}");
        let frame = build_register_write(register, data);
        self.i2c
            .write(self.config.address, &frame)
            .map_err(Tmf882xError::Transport)
    }

    pub(crate) fn read_register(&mut self, register: u8, buf: &mut [u8]) -> Result<(), I2C::Error> {
        self.i2c
            .write_read(self.config.address, &[register], buf)
            .map_err(Tmf882xError::Transport)?;
        log::trace!("read {register:#04x} -> {buf:02x?}");
        Ok(())
    }

    pub(crate) fn read_u8(&mut self, register: u8) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.read_register(register, &mut buf)?;
        Ok(buf[0])
    }

    pub(crate) fn read_u16(&mut self, register: u8) -> Result<u16, I2C::Error> {
        let mut buf = [0u8; 2];
        self.read_register(register, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Read `len` bytes starting at `register` in bus-sized chunks.
    pub(crate) fn read_block(&mut self, register: u8, len: usize) -> Result<Vec<u8>, I2C::Error> {
        let mut data = vec![0u8; len];
        for (chunk_register, range) in transfer_chunks(register, len) {
            self.read_register(chunk_register, &mut data[range])?;
        }
        Ok(data)
    }

    pub(crate) fn write_block(&mut self, register: u8, data: &[u8]) -> Result<(), I2C::Error> {
        for (chunk_register, range) in transfer_chunks(register, data.len()) {
            self.write_register(chunk_register, &data[range])?;
        }
        Ok(())
    }
}

/// Scoped enable: dereferences to the driver, puts the device in standby
/// when dropped.
pub struct Enabled<'a, I2C: I2c, D: DelayNs> {
    device: &'a mut Tmf882x<I2C, D>,
}

impl<I2C: I2c, D: DelayNs> Deref for Enabled<'_, I2C, D> {
    type Target = Tmf882x<I2C, D>;

    fn deref(&self) -> &Self::Target {
        self.device
    }
}

impl<I2C: I2c, D: DelayNs> DerefMut for Enabled<'_, I2C, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.device
    }
}

impl<I2C: I2c, D: DelayNs> Drop for Enabled<'_, I2C, D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.standby() {
            log::warn!("standby on release failed: {e:?}");
        }
    }
}
