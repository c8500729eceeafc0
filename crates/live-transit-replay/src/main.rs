mod error;
mod logging;
mod replay;
mod settings;

use settings::Settings;
use std::process::ExitCode;

fn main() -> ExitCode {
    logging::setup_logging();
    let settings = Settings::from_cli();

    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::new(stdout.lock());
    match replay::run(&settings, &mut out) {
        Ok(summary) => {
            tracing::info!(
                "Done: {} frames, {} vehicles evicted",
                summary.frames,
                summary.evicted
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Replay failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
