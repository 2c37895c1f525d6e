use std::env;
use std::fs;
use std::rc::Rc;

use log::info;

use reclip::api::Backend;
use reclip::engine::{Intent, RecorderApp, UiEvent};
use reclip::media::{RecordingMode, SyntheticProvider, TARGET_FPS};
use reclip::session::{FileTokenStore, SessionManager};
use reclip::trim::SegmentDurationProbe;
use reclip::{ApiClient, RawSegmentEncoder};

const USAGE: &str = "usage: reclip <command>

commands:
  record [seconds] [screen|webcam|combined]   record a synthetic capture and upload it
  list                                        list this session's recordings
  raw <file>                                  print the deterministic raw URL
  secure <file>                               request a time-limited share link
  public <file>                               request a durable public link
  revoke <file>                               disable the public link
  email <file> <to>                           share a recording by e-mail
  embed <file> [width] [height]               print an embeddable snippet
  clip <file> <start> <end>                   trim a recording server-side
  delete <file>                               delete a recording
  fetch <file> <out>                          download the mp4 rendition
  forget                                      sever this session's identity
  contact <from> <subject> <message>          send a message to the operators
  marker <start|stop>                         legacy server-side recording markers";

fn main() -> anyhow::Result<()> {
    reclip::logging::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let session = Rc::new(SessionManager::new(Box::new(FileTokenStore)));
    let base = reclip::config::resolve_api_base();
    let client = Rc::new(ApiClient::new(base.clone(), Rc::clone(&session))?);
    info!("Talking to {base}");

    // Legacy markers go straight to the backend; everything else runs
    // through the engine.
    if command == "marker" {
        match args.get(1).map(String::as_str) {
            Some("start") => {
                client.start_marker()?;
                println!("started");
            }
            Some("stop") => println!("{}", client.stop_marker()?),
            _ => {
                eprintln!("{USAGE}");
                std::process::exit(2);
            }
        }
        return Ok(());
    }

    let frames = match command.as_str() {
        // Synthetic sources run for a fixed tick budget and then end like a
        // real stop-sharing event.
        "record" => {
            let secs = args.get(1).and_then(|s| s.parse::<u64>().ok()).unwrap_or(5);
            Some(secs * u64::from(TARGET_FPS))
        }
        _ => None,
    };

    let backend: Rc<dyn Backend> = Rc::clone(&client) as Rc<dyn Backend>;
    let app = RecorderApp::new(
        session,
        Rc::clone(&backend),
        Box::new(SyntheticProvider::new(frames)),
        Box::new(RawSegmentEncoder),
        Box::new(SegmentDurationProbe::new(backend)),
    );

    match command.as_str() {
        "record" => {
            let mode = match args.get(2).map(String::as_str) {
                Some("webcam") => RecordingMode::WebcamOnly,
                Some("combined") => RecordingMode::Combined,
                _ => RecordingMode::ScreenOnly,
            };
            let (camera, mic) = match mode {
                RecordingMode::ScreenOnly => (None, None),
                _ => (Some("default".to_string()), Some("default".to_string())),
            };
            app.handle(Intent::StartRecording { mode, camera, mic });
            report(app.drain_events(), None)?;
            while app.capture_state() != reclip::CaptureState::Idle {
                app.tick();
                report(app.drain_events(), None)?;
            }
        }
        "list" => {
            app.handle(Intent::LoadCatalog);
            report(app.drain_events(), None)?;
            for file in app.catalog_files() {
                println!("{file}");
            }
        }
        "raw" | "secure" | "public" | "revoke" | "email" | "embed" | "clip" | "delete"
        | "fetch" => {
            let Some(file) = args.get(1).cloned() else {
                eprintln!("{USAGE}");
                std::process::exit(2);
            };
            app.handle(Intent::SelectFile(Some(file)));
            app.drain_events();

            let mut out_path = None;
            match command.as_str() {
                "raw" => app.handle(Intent::RawLink),
                "secure" => app.handle(Intent::SecureLink),
                "public" => app.handle(Intent::PublicLink),
                "revoke" => app.handle(Intent::DisablePublicLink),
                "email" => {
                    let Some(to) = args.get(2).cloned() else {
                        eprintln!("{USAGE}");
                        std::process::exit(2);
                    };
                    app.handle(Intent::Email { to });
                }
                "embed" => {
                    let width = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(640);
                    let height = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(360);
                    app.handle(Intent::EmbedCode { width, height });
                }
                "clip" => {
                    let (Some(start), Some(end)) = (
                        args.get(2).and_then(|s| s.parse::<f64>().ok()),
                        args.get(3).and_then(|s| s.parse::<f64>().ok()),
                    ) else {
                        eprintln!("{USAGE}");
                        std::process::exit(2);
                    };
                    app.handle(Intent::OpenTrim);
                    app.handle(Intent::SetTrimStart(start));
                    app.handle(Intent::SetTrimEnd(end));
                    app.handle(Intent::SubmitTrim);
                }
                "delete" => app.handle(Intent::Delete {
                    filename: None,
                    confirmed: true,
                }),
                "fetch" => {
                    let Some(path) = args.get(2).cloned() else {
                        eprintln!("{USAGE}");
                        std::process::exit(2);
                    };
                    out_path = Some(path);
                    app.handle(Intent::Download);
                }
                _ => unreachable!(),
            }
            report(app.drain_events(), out_path.as_deref())?;
        }
        "forget" => {
            app.handle(Intent::ForgetSession);
            report(app.drain_events(), None)?;
        }
        "contact" => {
            let (Some(from_email), Some(subject), Some(message)) =
                (args.get(1), args.get(2), args.get(3))
            else {
                eprintln!("{USAGE}");
                std::process::exit(2);
            };
            app.handle(Intent::Contact {
                from_email: from_email.clone(),
                subject: subject.clone(),
                message: message.clone(),
            });
            report(app.drain_events(), None)?;
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}

/// Prints engine events; downloaded bytes land in `out_path` when given.
fn report(events: Vec<UiEvent>, out_path: Option<&str>) -> anyhow::Result<()> {
    let mut failed = false;
    for event in events {
        match event {
            UiEvent::StateChanged(state) => println!("state: {state:?}"),
            UiEvent::Status(message) => println!("{message}"),
            UiEvent::Uploaded { filename } => println!("uploaded: {filename}"),
            UiEvent::CatalogChanged(files) => println!("catalog: {}", files.join(", ")),
            UiEvent::ActiveChanged(file) => {
                println!("active: {}", file.as_deref().unwrap_or("(none)"))
            }
            UiEvent::LinkReady { kind, url } => println!("{kind:?} link: {url}"),
            UiEvent::EmbedReady(snippet) => println!("{snippet}"),
            UiEvent::EmailSent { to } => println!("sent to {to}"),
            UiEvent::DownloadReady { filename, bytes } => {
                if let Some(path) = out_path {
                    fs::write(path, &bytes)?;
                    println!("{filename}: {} bytes written to {path}", bytes.len());
                } else {
                    println!("{filename}: {} bytes", bytes.len());
                }
            }
            UiEvent::TrimReady {
                start,
                end,
                duration,
            } => println!("trim ready: {start}..{end} of {duration}s"),
            UiEvent::TrimSeek(position) => println!("seek: {position}"),
            UiEvent::ConfirmDelete(file) => println!("confirm deletion of {file}"),
            UiEvent::Deleted(file) => println!("deleted: {file}"),
            UiEvent::SessionForgotten => println!("session forgotten"),
            UiEvent::ActionFailed { action, message } => {
                eprintln!("{action} failed: {message}");
                failed = true;
            }
            UiEvent::Error(message) => {
                eprintln!("error: {message}");
                failed = true;
            }
        }
    }
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
