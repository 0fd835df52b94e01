//! List commands implementation

/// List all compiled-in transports
pub fn list_transports() {
    print!("{}", loralink_transport::transport_help());
}

/// List attached CH341 devices with the index to select each one
#[cfg(feature = "ch341")]
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let devices = loralink_ch341::Ch341::list_devices()?;
    if devices.is_empty() {
        println!("No CH341 devices found.");
        return Ok(());
    }

    println!("{:<7} {}", "Index", "Device");
    println!("{}", "-".repeat(32));
    for (index, device) in devices.iter().enumerate() {
        println!("{:<7} {}", index, device);
    }
    println!();
    println!("Select one with: -t ch341:index=<n>");
    Ok(())
}

#[cfg(not(feature = "ch341"))]
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    Err("CH341 support not compiled in (enable the ch341 feature)".into())
}
