use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Transfer mode: one file, or every file of a directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Single,
    Sequence,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    Mark,
    Space,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StopBits {
    #[default]
    None,
    One,
    Two,
    OnePointFive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Handshake {
    #[default]
    None,
    XOnXOff,
    RequestToSend,
    RequestToSendXOnXOff,
}

/// Fully resolved settings for one run. Built once by the resolver and only
/// read afterwards.
#[derive(Clone, Debug)]
pub struct Config {
    pub input: PathBuf,
    pub mode: Mode,
    pub buffer_size: usize,
    pub delay_time: Duration,
    pub baud_rate: u32,
    pub port_name: String,
    pub parity: Parity,
    pub data_bits: u8,
    pub stop_bits: StopBits,
    pub handshake: Handshake,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Issue one zero-length write after end of file.
    pub final_empty_write: bool,
}

impl Config {
    /// Input path resolved against the current working directory.
    pub fn source_path(&self) -> io::Result<PathBuf> {
        Ok(std::env::current_dir()?.join(&self.input))
    }
}

#[cfg(test)]
pub(crate) fn test_config(input: impl Into<PathBuf>, mode: Mode) -> Config {
    Config {
        input: input.into(),
        mode,
        buffer_size: 4,
        delay_time: Duration::from_millis(10),
        baud_rate: 9600,
        port_name: "/dev/ttyTEST0".to_string(),
        parity: Parity::None,
        data_bits: 8,
        stop_bits: StopBits::One,
        handshake: Handshake::None,
        read_timeout: Duration::from_millis(500),
        write_timeout: Duration::from_millis(500),
        final_empty_write: true,
    }
}
