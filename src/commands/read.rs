//! Read command implementation

use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use fpgaflash_core::spi::PAGE_SIZE;
use fpgaflash_core::{flash, fpga, Bridge, Transport};

/// Run the read command: dump `length` bytes starting at `start` to a file
pub fn run_read<T: Transport>(
    bridge: &mut Bridge<T>,
    output: &Path,
    start: u32,
    length: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    fpga::enter_reset(bridge)?;
    fpga::release_flash_power_down(bridge)?;
    flash::verify_id(bridge)?;

    let pb = ProgressBar::new(length as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) Reading",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut data = Vec::with_capacity(length as usize);
    let mut addr = start;
    while data.len() < length as usize {
        let page = flash::read_page_fast(bridge, addr)?;
        data.extend_from_slice(&page);
        addr += PAGE_SIZE as u32;
        pb.set_position(data.len().min(length as usize) as u64);
    }
    data.truncate(length as usize);
    pb.finish_with_message("Read complete");

    // Nothing changed; let the FPGA reconfigure from the untouched flash.
    fpga::exit_reset(bridge)?;

    let mut file = File::create(output)?;
    file.write_all(&data)?;
    println!("Wrote {} bytes to {:?}", data.len(), output);

    Ok(())
}
