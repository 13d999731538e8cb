//! # Transcode Example
//!
//! Reads any file the desktop platform can decode and writes it back out
//! through the MP4 writer at quality option 4.
//!
//! Run with: `cargo run --example transcode --package core-formats -- <input> <output>`

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use bridge_desktop::DesktopMediaPlatform;
use bridge_traits::log::LogLevel;
use core_formats::{AudioFormatWriter, FormatRegistry, Mp4AudioFormat, Result};
use core_runtime::logging::{init_logging, strip_path, LogFormat, LoggingConfig};
use parking_lot::Mutex;
use tracing::info;

const QUALITY_OPTION_INDEX: i32 = 4;

fn transcode(input: &Path, output: &Path) -> Result<i64> {
    let format = Arc::new(Mp4AudioFormat::new(Arc::new(DesktopMediaPlatform::new())));
    let mut registry = FormatRegistry::new();
    registry.register(format.clone());

    let source = File::open(input).map_err(bridge_traits::BridgeError::from)?;
    let mut reader = registry.create_reader_for_file(input, Arc::new(Mutex::new(source)))?;
    info!(
        file = %strip_path(&input.to_string_lossy()),
        sample_rate = reader.sample_rate(),
        channels = reader.num_channels(),
        frames = reader.length_in_samples(),
        "Opened input"
    );

    let options = format
        .default_writer_options(reader.sample_rate(), reader.num_channels())
        .with_quality_option_index(QUALITY_OPTION_INDEX);
    let target = File::create(output).map_err(bridge_traits::BridgeError::from)?;
    let mut writer = format.open_writer(Arc::new(Mutex::new(target)), &options)?;

    let frames = writer.write_from_reader(
        reader.as_mut(),
        0,
        None,
        format.config().block_size,
    )?;
    writer.flush()?;
    writer.finish()?;
    Ok(frames)
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("usage: {} <input> <output>", args[0]);
        std::process::exit(1);
    }

    let logging = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Info);
    if let Err(e) = init_logging(logging) {
        eprintln!("{}", e);
    }

    match transcode(Path::new(&args[1]), Path::new(&args[2])) {
        Ok(frames) => info!(frames, "Transcode complete"),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
