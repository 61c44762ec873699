mod config;
mod serial_utils;
mod settings;
mod transfer;

use clap::{Arg, ArgAction, Command};
use log::{error, info};
use settings::UsageError;
use std::path::PathBuf;
use std::process;
use transfer::{ThreadSleep, Transfer};

/// Environment variable naming an optional TOML file of default settings.
const DEFAULTS_ENV: &str = "JPG2SERIAL_DEFAULTS";

const SETTINGS_HELP: &str = "\
Settings (NAME is case-insensitive, enum values are case-sensitive):
  -input=PATH            file (single) or directory (sequence), required
  -mode=MODE             single | sequence, required
  -buffer_size=BYTES     bytes per chunk [default: 1024]
  -delay_time=MS         pause between chunk writes [default: 10]
  -baud_rate=N           required
  -port_name=NAME        serial device, e.g. COM4 or /dev/ttyUSB0, required
  -parity=P              None | Odd | Even | Mark | Space, required
  -data_bits=N           [default: 8]
  -stop_bits=S           None | One | OnePointFive | Two
  -handshake=H           None | XOnXOff | RequestToSend | RequestToSendXOnXOff
  -read_timeout=MS       [default: 500]
  -write_timeout=MS      [default: 500]
  -final_empty_write=B   send a zero-length write after each file [default: true]

Defaults may also be stored in the TOML file named by JPG2SERIAL_DEFAULTS.";

fn cli() -> Command {
    // Settings look like short flags, so clap's own short flags are turned off.
    Command::new("jpg2serial")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Uploads an image, or a directory of images, to a device over a serial port")
        .disable_help_flag(true)
        .disable_version_flag(true)
        .after_help(SETTINGS_HELP)
        .arg(
            Arg::new("help")
                .long("help")
                .action(ArgAction::Help)
                .help("Print help"),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .action(ArgAction::Version)
                .help("Print version"),
        )
        .arg(
            Arg::new("settings")
                .value_name("-NAME=VALUE")
                .num_args(1..)
                .action(ArgAction::Append)
                .allow_hyphen_values(true)
                .trailing_var_arg(true),
        )
}

fn run(args: &[String], defaults_file: Option<PathBuf>) -> anyhow::Result<()> {
    let config = settings::resolve_config(args, defaults_file.as_deref())?;

    info!("Configuring serial port...");
    let builder = serial_utils::configure_serial_port(&config)?;

    let report = Transfer::new(&config, builder, ThreadSleep).run()?;
    info!(
        "Done! {} file(s), {} bytes in {} writes",
        report.files, report.bytes, report.writes
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    let args: Vec<String> = matches
        .get_many::<String>("settings")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let defaults_file = std::env::var_os(DEFAULTS_ENV).map(PathBuf::from);

    if let Err(e) = run(&args, defaults_file) {
        error!("{:#}", e);
        if e.downcast_ref::<UsageError>().is_some() {
            error!("Run with --help for the list of settings.");
            process::exit(2);
        }
        process::exit(1);
    }
}
