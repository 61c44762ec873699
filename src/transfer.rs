use crate::config::{Config, Mode};
use anyhow::{Context, Result};
use log::{debug, info, trace};
use std::fs::{self, File};
use std::io::{self, Read};
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Destination of the chunk stream. One value is one open channel; dropping
/// it closes the channel.
pub trait ChunkSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Called once after the last chunk of a file, before the channel is dropped.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Opens a fresh channel with fixed parameters.
pub trait ChannelOpener {
    type Channel: ChunkSink;

    fn open(&mut self) -> io::Result<Self::Channel>;
}

/// Blocks the caller between two chunk writes.
pub trait Pacer {
    fn pause(&mut self, delay: Duration);
}

pub struct ThreadSleep;

impl Pacer for ThreadSleep {
    fn pause(&mut self, delay: Duration) {
        thread::sleep(delay);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub files: usize,
    pub bytes: u64,
    /// Chunk writes issued, including any zero-length terminal write.
    pub writes: usize,
}

impl AddAssign for TransferReport {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.bytes += other.bytes;
        self.writes += other.writes;
    }
}

/// Fills `buffer` from `source`, stopping early only at end of input.
fn read_chunk<R: Read + ?Sized>(source: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match source.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Copies `source` into `channel` one buffer at a time, pausing `delay`
/// between consecutive writes. With `final_empty_write` the end of input is
/// signalled by one zero-length write.
pub fn stream_chunks<R, C, P>(
    source: &mut R,
    channel: &mut C,
    pacer: &mut P,
    buffer: &mut [u8],
    delay: Duration,
    final_empty_write: bool,
) -> io::Result<TransferReport>
where
    R: Read + ?Sized,
    C: ChunkSink + ?Sized,
    P: Pacer + ?Sized,
{
    let mut report = TransferReport::default();
    loop {
        let n = read_chunk(source, buffer)?;
        if n == 0 && !final_empty_write {
            break;
        }
        if report.writes > 0 && !delay.is_zero() {
            pacer.pause(delay);
        }
        channel.write_chunk(&buffer[..n])?;
        report.writes += 1;
        report.bytes += n as u64;
        trace!("wrote chunk {} ({} bytes)", report.writes, n);
        if n == 0 {
            break;
        }
    }
    Ok(report)
}

/// Regular files directly inside `dir`, in the order the filesystem lists
/// them. Subdirectories are skipped.
pub fn sequence_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to list directory {}", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to list directory {}", dir.display()))?
            .path();
        if path.is_file() {
            files.push(path);
        } else {
            trace!("skipping {}", path.display());
        }
    }
    Ok(files)
}

pub struct Transfer<'a, O, P> {
    config: &'a Config,
    opener: O,
    pacer: P,
    buffer: Vec<u8>,
}

impl<'a, O: ChannelOpener, P: Pacer> Transfer<'a, O, P> {
    pub fn new(config: &'a Config, opener: O, pacer: P) -> Self {
        Self {
            config,
            opener,
            pacer,
            buffer: vec![0u8; config.buffer_size],
        }
    }

    /// Sends the configured input according to the configured mode.
    pub fn run(&mut self) -> Result<TransferReport> {
        let source = self
            .config
            .source_path()
            .context("failed to resolve the current directory")?;
        match self.config.mode {
            Mode::Single => {
                info!("Sending individual image: {}", source.display());
                self.send_file(&source)
            }
            Mode::Sequence => {
                info!("Sending sequence of images from directory: {}", source.display());
                self.send_sequence(&source)
            }
        }
    }

    /// One channel open/close cycle around one file.
    pub fn send_file(&mut self, path: &Path) -> Result<TransferReport> {
        let port = &self.config.port_name;
        let mut channel = self
            .opener
            .open()
            .with_context(|| format!("failed to open serial port {}", port))?;
        debug!("serial port {} open", port);

        let mut file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut report = stream_chunks(
            &mut file,
            &mut channel,
            &mut self.pacer,
            &mut self.buffer,
            self.config.delay_time,
            self.config.final_empty_write,
        )
        .with_context(|| format!("transfer of {} to {} aborted", path.display(), port))?;
        channel
            .finish()
            .with_context(|| format!("failed to flush serial port {}", port))?;
        drop(channel);
        debug!("serial port {} closed", port);

        report.files = 1;
        info!(
            "Sent {} ({} bytes in {} writes)",
            path.display(),
            report.bytes,
            report.writes
        );
        Ok(report)
    }

    /// Sends every file of `dir`; stops at the first failure.
    pub fn send_sequence(&mut self, dir: &Path) -> Result<TransferReport> {
        let mut total = TransferReport::default();
        for path in sequence_files(dir)? {
            total += self.send_file(&path)?;
        }
        info!(
            "Sent {} files from {} ({} bytes)",
            total.files,
            dir.display(),
            total.bytes
        );
        Ok(total)
    }
}
