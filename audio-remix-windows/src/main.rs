use std::process::ExitCode;

use clap::Parser;

use audio_remix_windows::cli::Args;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    run(&args)
}

#[cfg(target_os = "windows")]
fn run(args: &Args) -> ExitCode {
    match audio_remix_windows::app::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn run(_args: &Args) -> ExitCode {
    log::error!("audio-remix streams through WASAPI and only runs on Windows");
    ExitCode::FAILURE
}
