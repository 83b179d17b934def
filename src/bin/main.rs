use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use warden::cli::{Cli, Commands, parse_args};
use warden::config::{ConfigStore, GlobalSettings};
use warden::constants::DEFAULT_INTERPRETER;
use warden::process::StartOptions;
use warden::status::ProcessSnapshot;
use warden::supervisor::Supervisor;

const ALL: &str = "all";

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args();

    let state_dir = args
        .state_dir
        .clone()
        .unwrap_or_else(ConfigStore::default_state_dir);
    let config_store = ConfigStore::new(state_dir.clone())?;
    let settings = config_store.load_settings();

    init_logging(&args, &settings);

    let supervisor = Supervisor::new(state_dir)?;

    let exit_code = match args.command {
        Commands::Start {
            script,
            name,
            cwd,
            interpreter,
            args: script_args,
            env,
            max_restarts,
            restart_delay,
            no_autorestart,
            max_memory_restart,
            watch,
        } => {
            let name = name.unwrap_or_else(|| derive_name(&script));
            let options = StartOptions {
                cwd: cwd.unwrap_or_else(|| std::env::current_dir().unwrap_or_default()),
                args: script_args,
                env: env.into_iter().collect(),
                interpreter: interpreter.unwrap_or_else(|| DEFAULT_INTERPRETER.to_string()),
                max_restarts: max_restarts.unwrap_or(settings.max_restarts_default),
                restart_delay_ms: restart_delay.unwrap_or(settings.restart_delay_default_ms),
                autorestart: !no_autorestart,
                watch,
                max_memory_restart: max_memory_restart
                    .or_else(|| Some(settings.max_memory_restart_default.clone())),
            };
            if supervisor.start(&name, &script, options) {
                println!("started '{name}'");
                0
            } else {
                eprintln!("failed to start '{name}'");
                1
            }
        }

        Commands::Stop { name, force } => {
            if name == ALL {
                let count = supervisor.stop_all(force);
                println!("stopped {count} process(es)");
                0
            } else if supervisor.stop(&name, force) {
                println!("stopped '{name}'");
                0
            } else {
                eprintln!("'{name}' is not running");
                1
            }
        }

        Commands::Restart { name } => {
            if name == ALL {
                let count = supervisor.restart_all();
                println!("restarted {count} process(es)");
                0
            } else if supervisor.restart(&name) {
                println!("restarted '{name}'");
                0
            } else {
                eprintln!("failed to restart '{name}'");
                1
            }
        }

        Commands::Delete { name } => {
            if name == ALL {
                let count = supervisor.delete_all();
                println!("deleted {count} process(es)");
                0
            } else if supervisor.delete(&name) {
                println!("deleted '{name}'");
                0
            } else {
                eprintln!("'{name}' is not registered");
                1
            }
        }

        Commands::List { json } => {
            print_snapshot_table(&supervisor.list(), json)?;
            0
        }

        Commands::Logs { name, lines, follow } => run_logs(&supervisor, &name, lines, follow)?,

        Commands::Flush { name } => {
            if supervisor.flush_logs(name.as_deref()) {
                println!("flushed logs");
                0
            } else {
                eprintln!("failed to flush logs");
                1
            }
        }

        Commands::Monit => run_monit(&supervisor)?,

        Commands::Resurrect => {
            let count = supervisor.resurrect();
            println!("resurrected {count} process(es)");
            0
        }
    };

    supervisor.shutdown();
    std::process::exit(exit_code);
}

fn derive_name(script: &str) -> String {
    PathBuf::from(script)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| script.to_string())
}

/// Resolves the filter in priority order: explicit `--log-level`, then
/// `RUST_LOG`, then the persisted global setting's `log_level`.
fn init_logging(args: &Cli, settings: &GlobalSettings) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()))
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Installs a Ctrl-C handler that flips the returned flag exactly once.
fn interrupt_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    let _ = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    });
    flag
}

fn run_logs(
    supervisor: &Supervisor,
    name: &str,
    lines: usize,
    follow: bool,
) -> Result<i32, Box<dyn Error>> {
    for line in supervisor.logs(name, lines)? {
        println!("{line}");
    }

    if !follow {
        return Ok(0);
    }

    let stop = interrupt_flag();
    supervisor.follow_logs(name, Arc::clone(&stop), |line| println!("{line}"))?;
    Ok(130)
}

fn run_monit(supervisor: &Supervisor) -> Result<i32, Box<dyn Error>> {
    let stop = interrupt_flag();
    while !stop.load(Ordering::Relaxed) {
        print!("\x1B[2J\x1B[H");
        print_snapshot_table(&supervisor.list(), false)?;
        std::thread::sleep(Duration::from_secs(1));
    }
    Ok(130)
}

struct Column {
    title: &'static str,
    width: usize,
}

const COLUMNS: [Column; 6] = [
    Column { title: "NAME", width: 20 },
    Column { title: "STATUS", width: 10 },
    Column { title: "PID", width: 8 },
    Column { title: "RESTARTS", width: 9 },
    Column { title: "CPU", width: 8 },
    Column { title: "MEM", width: 10 },
];

fn print_snapshot_table(snapshots: &[ProcessSnapshot], json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshots)?);
        return Ok(());
    }

    if snapshots.is_empty() {
        println!("No processes registered.");
        return Ok(());
    }

    println!("{}", make_border());
    println!("{}", format_header());
    println!("{}", make_border());
    for snapshot in snapshots {
        println!("{}", format_row(snapshot));
    }
    println!("{}", make_border());
    Ok(())
}

fn make_border() -> String {
    let mut line = String::from("+");
    for column in &COLUMNS {
        line.push_str(&"-".repeat(column.width + 2));
        line.push('+');
    }
    line
}

fn format_header() -> String {
    let mut row = String::from("|");
    for column in &COLUMNS {
        row.push_str(&format!(" {:^width$} |", column.title, width = column.width));
    }
    row
}

fn format_row(snapshot: &ProcessSnapshot) -> String {
    let pid = snapshot
        .pid
        .map(|pid| pid.to_string())
        .unwrap_or_else(|| "-".to_string());
    let cpu = snapshot
        .cpu_percent
        .map(|cpu| format!("{cpu:.1}%"))
        .unwrap_or_else(|| "-".to_string());
    let mem = snapshot
        .memory_mb
        .map(|mem| format!("{mem}MB"))
        .unwrap_or_else(|| "-".to_string());

    format!(
        "| {:<20} | {:<10} | {:>8} | {:>9} | {:>8} | {:>10} |",
        truncate(&snapshot.name, 20),
        snapshot.status.to_string(),
        pid,
        snapshot.restart_count,
        cpu,
        mem,
    )
}

fn truncate(s: &str, width: usize) -> String {
    if s.len() <= width {
        s.to_string()
    } else {
        format!("{}…", &s[..width.saturating_sub(1)])
    }
}
