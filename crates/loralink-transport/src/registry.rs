//! Transport registry
//!
//! Maps transport names (and their aliases) to backend constructors.

use std::collections::HashMap;

use loralink_core::SpiTransport;

use crate::error::FactoryError;

/// Information about a transport backend
#[derive(Debug, Clone, Copy)]
pub struct TransportInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

impl TransportInfo {
    fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.contains(&name)
    }
}

/// Parsed transport specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportParams {
    /// Transport name as given
    pub name: String,
    /// Key-value options
    pub params: HashMap<String, String>,
}

impl TransportParams {
    fn options(&self) -> Vec<(&str, &str)> {
        let mut options: Vec<(&str, &str)> = self
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        options.sort_unstable();
        options
    }
}

/// Parse a transport string into name and options
///
/// Format: `name` or `name:key1=value1,key2=value2`
pub fn parse_transport_params(spec: &str) -> Result<TransportParams, FactoryError> {
    let (name, opts_str) = spec.split_once(':').unwrap_or((spec, ""));
    let name = name.trim();
    if name.is_empty() {
        return Err(FactoryError::InvalidParameter(
            "missing transport name".to_string(),
        ));
    }

    let mut params = HashMap::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            match opt.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    params.insert(key.trim().to_string(), value.trim().to_string());
                }
                _ => {
                    return Err(FactoryError::InvalidParameter(format!(
                        "'{}' (expected key=value)",
                        opt
                    )));
                }
            }
        }
    }

    Ok(TransportParams {
        name: name.to_string(),
        params,
    })
}

/// Get information about all transports enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_transports() -> Vec<TransportInfo> {
    let mut transports = Vec::new();

    #[cfg(feature = "ch341")]
    transports.push(TransportInfo {
        name: "ch341",
        aliases: &["ch341a", "ch341_spi"],
        description: "CH341 USB-to-SPI bridge (VID:1a86 PID:5512) (index=<n>,lsb_first=<0|1>)",
    });

    #[cfg(feature = "linux-spi")]
    transports.push(TransportInfo {
        name: "linux_spi",
        aliases: &["linux-spi", "spidev"],
        description:
            "Linux spidev interface (dev=/dev/spidevX.Y,spispeed=<kHz>,mode=<0-3>,gpiochip=<n>)",
    });

    #[cfg(feature = "dummy")]
    transports.push(TransportInfo {
        name: "dummy",
        aliases: &[],
        description: "Simulated SX1276 radio for testing",
    });

    transports
}

/// Canonical name for a transport name or alias
pub fn find_transport(name: &str) -> Option<&'static str> {
    available_transports()
        .into_iter()
        .find(|t| t.matches(name))
        .map(|t| t.name)
}

/// Help text listing all available transports
pub fn transport_help() -> String {
    let transports = available_transports();
    if transports.is_empty() {
        return "No transports available (recompile with transport features enabled)".to_string();
    }

    let mut help = String::from("Available transports:\n");
    for t in &transports {
        help.push_str(&format!("  {:10} - {}\n", t.name, t.description));
        if !t.aliases.is_empty() {
            help.push_str(&format!("  {:10}   aliases: {}\n", "", t.aliases.join(", ")));
        }
    }
    help
}

/// Short comma-separated list of transport names for CLI help
pub fn transport_names_short() -> String {
    let names: Vec<&str> = available_transports().iter().map(|t| t.name).collect();
    names.join(", ")
}

/// Create a transport from a specification string
///
/// The transport is returned closed; call `open` (or hand it to a radio
/// driver that does) before use.
///
/// # Example
/// ```no_run
/// use loralink_core::SpiTransport;
///
/// let transport = loralink_transport::create_transport("linux_spi:dev=/dev/spidev0.0")?;
/// assert!(!transport.is_active());
/// # Ok::<(), loralink_transport::FactoryError>(())
/// ```
pub fn create_transport(spec: &str) -> Result<Box<dyn SpiTransport>, FactoryError> {
    let params = parse_transport_params(spec)?;
    let name = find_transport(&params.name)
        .ok_or_else(|| FactoryError::UnsupportedType(params.name.clone()))?;

    log::debug!("Creating {} transport", name);

    match name {
        #[cfg(feature = "ch341")]
        "ch341" => build_ch341(&params),

        #[cfg(feature = "linux-spi")]
        "linux_spi" => build_linux_spi(&params),

        #[cfg(feature = "dummy")]
        "dummy" => build_dummy(&params),

        _ => Err(FactoryError::UnsupportedType(params.name)),
    }
}

/// Create a transport from a specification string and open it
pub fn open_transport(spec: &str) -> Result<Box<dyn SpiTransport>, FactoryError> {
    let mut transport = create_transport(spec)?;
    transport.open()?;
    Ok(transport)
}

/// Create a CH341 transport for the nth attached device
#[cfg(feature = "ch341")]
pub fn create_ch341(index: usize, lsb_first: bool) -> Box<dyn SpiTransport> {
    Box::new(loralink_ch341::Ch341::with_index(index, lsb_first))
}

/// Create a Linux spidev transport
#[cfg(feature = "linux-spi")]
pub fn create_linux_spi(config: loralink_linux_spi::LinuxSpiConfig) -> Box<dyn SpiTransport> {
    Box::new(loralink_linux_spi::LinuxSpi::new(config))
}

#[cfg(feature = "ch341")]
fn build_ch341(params: &TransportParams) -> Result<Box<dyn SpiTransport>, FactoryError> {
    let config = loralink_ch341::parse_options(&params.options())
        .map_err(|e| FactoryError::InvalidParameter(format!("ch341: {}", e)))?;
    log::info!(
        "Using CH341 device {}{}",
        config.index,
        if config.lsb_first { " (LSB first)" } else { "" }
    );
    Ok(Box::new(loralink_ch341::Ch341::new(config)))
}

#[cfg(feature = "linux-spi")]
fn build_linux_spi(params: &TransportParams) -> Result<Box<dyn SpiTransport>, FactoryError> {
    let config = loralink_linux_spi::parse_options(&params.options())
        .map_err(|e| FactoryError::InvalidParameter(format!("linux_spi: {}", e)))?;
    log::info!(
        "Using {} at {} kHz, mode {}",
        config.device,
        config.speed_hz / 1000,
        config.mode
    );
    Ok(create_linux_spi(config))
}

#[cfg(feature = "dummy")]
fn build_dummy(params: &TransportParams) -> Result<Box<dyn SpiTransport>, FactoryError> {
    for key in params.params.keys() {
        log::warn!("dummy: Unknown option: {}", key);
    }
    log::info!("Using simulated radio");
    Ok(Box::new(loralink_dummy::SimulatedRfm95::new()))
}
