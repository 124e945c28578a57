use linux_embedded_hal::{Delay, I2cdev};
use tmf882x::Tmf882x;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bus = std::env::args().nth(1).unwrap_or_else(|| "/dev/i2c-1".into());
    let i2c = I2cdev::new(&bus)?;
    let mut tof = Tmf882x::new(i2c, Delay);

    let mut sensor = tof.enabled()?;
    println!("App:    {:#04x} (minor {})", sensor.app_id()?, sensor.app_minor()?);
    println!("Serial: {:#010x}", sensor.serial_number()?);

    let config = sensor.configuration()?;
    println!("\nPeriod:          {} ms", config.measurement_period_ms);
    println!("Kilo-iterations: {}", config.kilo_iterations);
    println!("Threshold:       {}", config.confidence_threshold);
    println!("SPAD map:        {}", config.spad_map_id);

    // 4x4 zones
    sensor.set_spad_map_id(7)?;
    for _ in 0..5 {
        let m = sensor.measure()?;
        println!("\n#{} at {} °C, calibrated: {}", m.result_number, m.temperature_c, m.calibration_ok);
        if let Some(grid) = m.primary_grid() {
            for row in grid {
                println!("  {row:5?}");
            }
        }
    }

    // The guard puts the sensor back in standby when it drops.
    Ok(())
}
