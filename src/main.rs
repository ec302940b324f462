mod app;
mod archive;
mod config;
mod copier;
mod game;
mod manifest;
mod ops;
mod progress;

use anyhow::Result;
use app::{App, OpMessage, OpOutcome};
use ops::VerifyReport;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::io::Write;
use std::path::PathBuf;

fn print_usage() {
    println!("sevensmith - 7 Days to Die mod installer");
    println!("  --exe <path>       Pick {} to set the game folder", game::GAME_EXE);
    println!("  backup             Move current mods into a timestamped snapshot");
    println!("  install <zip>      Install mods from a zip archive");
    println!("  restore <dir>      Restore a ModsBackup_* snapshot");
    println!("  verify             Check manifest entries against the Mods folder");
    println!("Hint: the game usually lives under {}", game::STEAM_HINT);
}

fn main() -> Result<()> {
    let _ = TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );

    let mut args = std::env::args().skip(1);
    let mut app = App::initialize()?;

    match args.next().as_deref() {
        Some("--exe") => {
            let Some(path) = args.next() else {
                eprintln!("--exe requires a path");
                std::process::exit(2);
            };
            app.set_game_exe(&PathBuf::from(path))?;
            Ok(())
        }
        Some("backup") => {
            app.start_backup()?;
            run_to_completion(&mut app)
        }
        Some("install") => {
            let Some(path) = args.next() else {
                eprintln!("install requires a zip path");
                std::process::exit(2);
            };
            app.start_install(PathBuf::from(path))?;
            run_to_completion(&mut app)
        }
        Some("restore") => {
            let Some(path) = args.next() else {
                eprintln!("restore requires a snapshot directory");
                std::process::exit(2);
            };
            app.start_restore(PathBuf::from(path))?;
            run_to_completion(&mut app)
        }
        Some("verify") => {
            app.start_verify()?;
            run_to_completion(&mut app)
        }
        Some("--help") | Some("-h") | None => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            eprintln!("unknown command: {other}");
            print_usage();
            std::process::exit(2);
        }
    }
}

fn run_to_completion(app: &mut App) -> Result<()> {
    loop {
        match app.recv()? {
            OpMessage::Progress(progress) => {
                if let Some(detail) = &progress.detail {
                    println!("\r{detail}");
                } else {
                    print!("\r[{}] {}%", progress.phase.label(), progress.percent);
                    let _ = std::io::stdout().flush();
                }
            }
            OpMessage::Completed(outcome) => {
                println!();
                report_outcome(outcome);
                return Ok(());
            }
            OpMessage::Failed(message) => {
                println!();
                eprintln!("error: {message}");
                std::process::exit(1);
            }
        }
    }
}

fn report_outcome(outcome: OpOutcome) {
    match outcome {
        OpOutcome::Backup(report) => match report.snapshot {
            Some(snapshot) => println!(
                "Backup complete: {} mod(s) -> {}",
                report.mods.len(),
                snapshot.display()
            ),
            None => println!("No mods (other than {}) found - nothing to back up.", game::PROTECTED_DIR),
        },
        OpOutcome::Install(report) => {
            println!("Install complete. {} mod(s) added.", report.installed.len());
        }
        OpOutcome::Restore(report) => {
            println!("Restore complete: {} mod(s).", report.restored.len());
        }
        OpOutcome::Verify(report) => match report {
            VerifyReport::NoManifest => {
                println!("No manifest found - install mods with this tool first.");
            }
            VerifyReport::Checked(entries) => {
                let missing: Vec<&str> = entries
                    .iter()
                    .filter(|(_, present)| !**present)
                    .map(|(name, _)| name.as_str())
                    .collect();
                if missing.is_empty() {
                    println!("Integrity OK - all {} mod(s) present.", entries.len());
                } else {
                    println!("Integrity FAILED - missing: {}", missing.join(", "));
                }
            }
        },
    }
}
