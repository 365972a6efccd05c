//! Probe command implementation

use fpgaflash_core::{flash, fpga, Bridge, Transport};

/// Run the probe command
pub fn run_probe<T: Transport>(bridge: &mut Bridge<T>) -> Result<(), Box<dyn std::error::Error>> {
    // The SPI bus is shared with the FPGA; park it before touching the bus.
    fpga::enter_reset(bridge)?;
    fpga::release_flash_power_down(bridge)?;

    let id = flash::read_jedec_id(bridge)?;
    println!(
        "JEDEC ID: {:02x} {:02x} {:02x} (expected {:02x} {:02x} {:02x})",
        id[0],
        id[1],
        id[2],
        flash::JEDEC_ID[0],
        flash::JEDEC_ID[1],
        flash::JEDEC_ID[2]
    );

    let status = flash::read_status(bridge)?;
    println!(
        "Status: 0x{:02X} (WEL={}, WIP={})",
        status.bits(),
        status.write_enabled(),
        status.write_in_progress()
    );

    fpga::exit_reset(bridge)?;

    if id != flash::JEDEC_ID {
        return Err("unexpected chip - check wiring and power".into());
    }
    println!("Chip present and answering");
    Ok(())
}
