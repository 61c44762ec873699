use crate::config::{Config, Handshake, Parity, StopBits};
use crate::transfer::{ChannelOpener, ChunkSink};
use anyhow::{bail, Result};
use log::{debug, info, warn};
use serialport::{DataBits, FlowControl, SerialPort, SerialPortBuilder};
use std::io::{self, Write};

const PARITY_NAMES: &[(&str, Parity)] = &[
    ("None", Parity::None),
    ("Odd", Parity::Odd),
    ("Even", Parity::Even),
    ("Mark", Parity::Mark),
    ("Space", Parity::Space),
];

// Ordinal order differs from declaration order for stop bits.
const STOP_BITS_NAMES: &[(&str, StopBits)] = &[
    ("None", StopBits::None),
    ("One", StopBits::One),
    ("Two", StopBits::Two),
    ("OnePointFive", StopBits::OnePointFive),
];

const HANDSHAKE_NAMES: &[(&str, Handshake)] = &[
    ("None", Handshake::None),
    ("XOnXOff", Handshake::XOnXOff),
    ("RequestToSend", Handshake::RequestToSend),
    ("RequestToSendXOnXOff", Handshake::RequestToSendXOnXOff),
];

/// Looks `value` up by exact name or by ordinal. Anything else falls back to
/// the `None` member of the table.
fn parse_lenient<T: Copy + Default>(setting: &str, value: &str, names: &[(&str, T)]) -> T {
    if value.is_empty() {
        return T::default();
    }
    if let Some((_, member)) = names.iter().find(|(name, _)| *name == value) {
        return *member;
    }
    if let Ok(ordinal) = value.parse::<usize>() {
        if let Some((_, member)) = names.get(ordinal) {
            return *member;
        }
    }
    warn!("Unrecognized {} value {:?}, using None", setting, value);
    T::default()
}

pub fn parse_parity(value: &str) -> Parity {
    parse_lenient("parity", value, PARITY_NAMES)
}

pub fn parse_stop_bits(value: &str) -> StopBits {
    parse_lenient("stop_bits", value, STOP_BITS_NAMES)
}

pub fn parse_handshake(value: &str) -> Handshake {
    parse_lenient("handshake", value, HANDSHAKE_NAMES)
}

pub fn to_serialport_parity(parity: Parity) -> Result<serialport::Parity> {
    match parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Even => Ok(serialport::Parity::Even),
        Parity::Mark | Parity::Space => {
            bail!("parity {:?} is not supported by the serial driver", parity)
        }
    }
}

pub fn to_serialport_stop_bits(stop_bits: StopBits) -> Result<serialport::StopBits> {
    match stop_bits {
        StopBits::None => {
            debug!("stop_bits None requested, using one stop bit");
            Ok(serialport::StopBits::One)
        }
        StopBits::One => Ok(serialport::StopBits::One),
        StopBits::Two => Ok(serialport::StopBits::Two),
        StopBits::OnePointFive => bail!("1.5 stop bits are not supported by the serial driver"),
    }
}

pub fn to_flow_control(handshake: Handshake) -> Result<FlowControl> {
    match handshake {
        Handshake::None => Ok(FlowControl::None),
        Handshake::XOnXOff => Ok(FlowControl::Software),
        Handshake::RequestToSend => Ok(FlowControl::Hardware),
        Handshake::RequestToSendXOnXOff => {
            bail!("combined RTS and XON/XOFF handshake is not supported by the serial driver")
        }
    }
}

pub fn to_serialport_data_bits(bits: u8) -> Result<DataBits> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => bail!("{} data bits are not supported, expected 5 to 8", other),
    }
}

/// Builds a closed port handle from `config`. Nothing touches the device
/// until the builder is opened.
pub fn configure_serial_port(config: &Config) -> Result<SerialPortBuilder> {
    let data_bits = to_serialport_data_bits(config.data_bits)?;
    let parity = to_serialport_parity(config.parity)?;
    let stop_bits = to_serialport_stop_bits(config.stop_bits)?;
    let flow_control = to_flow_control(config.handshake)?;

    // The driver has a single timeout and the transfer only ever writes.
    let builder = serialport::new(config.port_name.as_str(), config.baud_rate)
        .data_bits(data_bits)
        .parity(parity)
        .stop_bits(stop_bits)
        .flow_control(flow_control)
        .timeout(config.write_timeout);

    info!(
        "Serial port {} configured: {} baud, {:?}, {:?}, {:?}, {:?}, write timeout {:?} (read timeout {:?})",
        config.port_name,
        config.baud_rate,
        data_bits,
        parity,
        stop_bits,
        flow_control,
        config.write_timeout,
        config.read_timeout
    );
    Ok(builder)
}

impl ChannelOpener for SerialPortBuilder {
    type Channel = Box<dyn SerialPort>;

    // The builder is consumed on open and reused once per file.
    fn open(&mut self) -> io::Result<Self::Channel> {
        SerialPortBuilder::open(self.clone()).map_err(io::Error::from)
    }
}

impl ChunkSink for Box<dyn SerialPort> {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.write_all(chunk)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.flush()
    }
}
