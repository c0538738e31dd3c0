use chrono::Local;
use fern::Dispatch;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use std::fs;
use std::path::Path;

const LOG_PATH: &str = "logs/arbiter.log";

/// Console-and-file logger of the demo binary.
///
/// The library never configures logging itself; it only emits through the
/// `log` macros, so embedders install whatever logger suits them. The
/// level comes from `RUST_LOG` (default `info`); arbitration tracing,
/// grant attempts, queue moves and owner-table writes sit on `debug`.
pub fn init() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::BrightBlack);

    let console = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} {:5} [{}] {}",
                Local::now().format("%H:%M:%S%.3f"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .chain(std::io::stderr());

    let mut root = Dispatch::new().level(level).chain(console);

    // the file sink is best effort; without it the console still works
    match open_log_file(LOG_PATH) {
        Ok(file) => {
            root = root.chain(
                Dispatch::new()
                    .format(|out, message, record| {
                        out.finish(format_args!(
                            "{} {:5} [{}] {}",
                            Local::now().format("%Y-%m-%d %H:%M:%S"),
                            record.level(),
                            record.target(),
                            message
                        ))
                    })
                    .chain(file),
            );
        }
        Err(e) => eprintln!("log file '{}' unavailable: {}", LOG_PATH, e),
    }

    if let Err(e) = root.apply() {
        eprintln!("logger already installed: {}", e);
        return;
    }

    log::info!("logging to console and '{}'", LOG_PATH);
}

fn open_log_file(path: &str) -> std::io::Result<fs::File> {
    if let Some(dir) = Path::new(path).parent() {
        fs::create_dir_all(dir)?;
    }
    fern::log_file(path)
}
