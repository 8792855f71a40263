use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};
use walkpad_controller::application::{ControllerConfig, SessionController, TreadmillHandle};
use walkpad_controller::domain::models::{AppEvent, MessageSeverity, SessionSnapshot};
use walkpad_controller::domain::settings::SettingsService;
use walkpad_controller::infrastructure::bluetooth::BleScanner;
use walkpad_controller::infrastructure::logging;
use walkpad_controller::infrastructure::workout_log::WorkoutLog;

#[derive(Debug, Clone, PartialEq)]
enum CliCommand {
    Connect,
    Disconnect,
    Speed(f64),
    Faster,
    Slower,
    Start,
    Stop,
    Status,
    History,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<CliCommand, String> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Err(String::new());
    };
    let command = match word.to_lowercase().as_str() {
        "connect" => CliCommand::Connect,
        "disconnect" => CliCommand::Disconnect,
        "speed" => {
            let value = parts.next().ok_or("usage: speed <km/h>")?;
            let speed = value
                .parse::<f64>()
                .map_err(|_| format!("not a number: {}", value))?;
            CliCommand::Speed(speed)
        }
        "+" => CliCommand::Faster,
        "-" => CliCommand::Slower,
        "start" => CliCommand::Start,
        "stop" => CliCommand::Stop,
        "status" => CliCommand::Status,
        "history" => CliCommand::History,
        "help" | "?" => CliCommand::Help,
        "quit" | "exit" => CliCommand::Quit,
        other => return Err(format!("unknown command: {} (try 'help')", other)),
    };
    Ok(command)
}

fn print_help() {
    println!("Commands:");
    println!("  connect          connect to the treadmill");
    println!("  disconnect       stop the belt and disconnect");
    println!("  speed <km/h>     set the belt speed (0 stops)");
    println!("  + / -            nudge the speed up or down");
    println!("  start / stop     start or stop a workout manually");
    println!("  status           show the current session");
    println!("  history          summarize saved workouts");
    println!("  quit             disconnect and exit");
}

fn print_status(snapshot: &SessionSnapshot) {
    println!("Connection: {}", snapshot.connection_state);
    println!("Session:    {:?}", snapshot.session_state);
    match snapshot.target_speed_kmh {
        Some(target) => println!(
            "Speed:      {:.1} km/h (target {:.1})",
            snapshot.speed_kmh, target
        ),
        None => println!("Speed:      {:.1} km/h", snapshot.speed_kmh),
    }
    println!("Distance:   {:.2} km", snapshot.distance_km);
    println!("Steps:      {}", snapshot.steps);
    println!("Time:       {}", snapshot.elapsed_display());
    if let Some(err) = &snapshot.last_error {
        println!("Last error: {}", err);
    }
}

fn print_history(workout_log: &WorkoutLog) {
    match workout_log.summary() {
        Ok(summary) => {
            println!(
                "{} workout(s), {:.2} km, {} steps",
                summary.count, summary.distance_km, summary.steps
            );
            if let Some(last) = summary.last {
                println!(
                    "Last: {} ({:.2} km, {} steps)",
                    last.start_time.format("%Y-%m-%d %H:%M"),
                    last.distance_km,
                    last.steps
                );
            }
        }
        Err(e) => println!("Could not read {}: {:#}", workout_log.path().display(), e),
    }
}

fn dispatch(
    handle: &TreadmillHandle,
    workout_log: &WorkoutLog,
    command: CliCommand,
    increment: f64,
) {
    match command {
        CliCommand::Connect => handle.connect(),
        CliCommand::Disconnect => handle.disconnect(),
        CliCommand::Speed(speed) => handle.set_speed(speed),
        CliCommand::Faster => handle.adjust_speed(increment),
        CliCommand::Slower => handle.adjust_speed(-increment),
        CliCommand::Start => handle.start_manual(),
        CliCommand::Stop => handle.stop_manual(),
        CliCommand::Status => print_status(&handle.current_snapshot()),
        CliCommand::History => print_history(workout_log),
        CliCommand::Help => print_help(),
        CliCommand::Quit => {}
    }
}

async fn forward_events(mut events: mpsc::UnboundedReceiver<AppEvent>, workout_log: WorkoutLog) {
    while let Some(event) = events.recv().await {
        match event {
            AppEvent::WorkoutFinished(record) => {
                if let Err(e) = workout_log.append(&record) {
                    error!("Failed to save workout: {:#}", e);
                }
            }
            AppEvent::LogMessage(msg) => {
                let tag = match msg.severity {
                    MessageSeverity::Info => "info",
                    MessageSeverity::Success => " ok ",
                    MessageSeverity::Warning => "warn",
                    MessageSeverity::Error => "FAIL",
                };
                println!("[{}] {}", tag, msg.message);
            }
            AppEvent::ConnectionStatus(state) => info!("Connection: {}", state),
            AppEvent::SessionState(state) => info!("Session: {:?}", state),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;
    let settings = settings_service.get().clone();

    let _logging_guard = logging::init_logger(&settings.log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting Walkpad Controller");
    info!("Settings: {}", settings_service.path().display());
    if !settings_service.path().exists() {
        // Write the defaults out so there is a file to edit
        if let Err(e) = settings_service.save() {
            error!("Failed to write default settings: {:#}", e);
        }
    }

    let config = ControllerConfig::from_settings(&settings)?;
    let scanner = BleScanner::new()
        .await
        .context("Bluetooth is not available")?;
    let workout_log = WorkoutLog::new(WorkoutLog::default_path()?);
    info!("Workouts are saved to {}", workout_log.path().display());

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (handle, task) = SessionController::spawn(scanner, config, event_tx);
    let printer = tokio::spawn(forward_events(event_rx, workout_log.clone()));

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(CliCommand::Quit) => break,
            Ok(command) => dispatch(
                &handle,
                &workout_log,
                command,
                settings.speed_increment_kmh,
            ),
            Err(msg) if msg.is_empty() => {}
            Err(msg) => println!("{}", msg),
        }
    }

    handle.shutdown();
    task.await?;
    drop(handle);
    let _ = printer.await;
    info!("Bye");
    Ok(())
}
