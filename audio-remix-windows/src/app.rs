//! The `audio-remix` run flow: resolve endpoints, stream until Enter is
//! pressed or the session dies, then report.

use std::io::BufRead;
use std::sync::Arc;
use std::thread;

use audio_remix_core::{CaptureRenderLoop, CaptureSourceKind, LogObserver, SessionHandle, SessionReport, Signal};

use crate::cli::Args;
use crate::com::init_mta;
use crate::device_enumerator::DeviceEnumerator;
use crate::device_selection::Direction;
use crate::error::AppError;
use crate::wasapi_capture::WasapiCapture;
use crate::wasapi_render::WasapiRender;

pub fn run(args: &Args) -> Result<(), AppError> {
    let _com = init_mta()?;
    let enumerator = DeviceEnumerator::new()?;

    if args.list_devices {
        return list_devices(&enumerator);
    }

    let config = args.session_config()?;

    let loopback = config.source_kind == CaptureSourceKind::RenderLoopback;
    let source_direction = Direction::source_of(config.source_kind);
    let in_device = match &args.in_device {
        Some(name) => enumerator.find_by_name(name, source_direction)?,
        None => enumerator.default_device(source_direction)?,
    };
    let out_device = match &args.out_device {
        Some(name) => enumerator.find_by_name(name, Direction::Render)?,
        None => enumerator.default_device(Direction::Render)?,
    };

    let capture = WasapiCapture::new(in_device, loopback);
    let render = WasapiRender::new(out_device);
    log::info!("<< {}", capture.name());
    log::info!(">> {}", render.name());

    let session = CaptureRenderLoop::new(capture, render, config, Arc::new(LogObserver))?;
    let handle = SessionHandle::spawn(session)?;

    if !handle.wait_started()? {
        return match handle.stop() {
            Ok(_) => Err(AppError::NeverStarted),
            Err(failure) => Err(failure.into()),
        };
    }

    let quit = handle.new_signal()?;
    watch_stdin(quit.clone())?;
    log::info!("Press Enter to quit...");

    let worker_exited = handle.wait_finished_or(&quit)?;
    if worker_exited {
        log::error!("the session thread terminated early");
    } else {
        log::info!("Stopping...");
    }

    match handle.stop() {
        Ok(report) if worker_exited => Err(AppError::TerminatedEarly { frames: report.frames }),
        Ok(report) => print_report(&report, args.json_report),
        Err(failure) => Err(failure.into()),
    }
}

fn list_devices(enumerator: &DeviceEnumerator) -> Result<(), AppError> {
    for direction in [Direction::Render, Direction::Capture] {
        let devices = enumerator.list(direction)?;
        println!("Active {} endpoints found: {}", direction, devices.len());
        for device in devices {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("    {}{}", device.name, marker);
        }
    }
    Ok(())
}

/// Raises `quit` once a line (or EOF) arrives on stdin.
///
/// The reader thread is detached: a blocked console read cannot be
/// cancelled, and process exit reaps it.
fn watch_stdin(quit: Signal) -> Result<(), AppError> {
    thread::Builder::new().name("stdin-watch".into()).spawn(move || {
        let mut line = String::new();
        if let Err(e) = std::io::stdin().lock().read_line(&mut line) {
            log::warn!("reading stdin failed: {}", e);
        }
        quit.set();
    })?;
    Ok(())
}

fn print_report(report: &SessionReport, json: bool) -> Result<(), AppError> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        log::info!(
            "streamed {} frames ({:.1} s) in {} passes; {} glitches, {} overflow retries",
            report.frames,
            report.seconds_streamed(),
            report.passes,
            report.glitches,
            report.overflow_retries
        );
    }
    Ok(())
}
