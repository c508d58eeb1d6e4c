mod writer;

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
    },
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand, arg};
use log::{error, info, warn};
use ridelog::{
    AppConfig, DashboardView, FileKeyValueStore, KeyValueStore, LogDashboard, LogNotifier,
    MemoryStore, NotificationPermission, RawFix, RideError, SessionController, SystemClock,
    dashboard::render_points_table,
    fuel::parse_setting_input,
    telemetry::{
        self, FixEvent,
        producer::{JsonlPositionSource, PositionSource},
    },
};

/// How often the stop timer is checked while waiting for fixes
const TICK_MS: u64 = 250;

static RECORDING: AtomicBool = AtomicBool::new(false);
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

type Controller = SessionController<Box<dyn KeyValueStore>, SystemClock, LogNotifier>;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Directory of the state store, overrides the config file
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// Do not deliver stop notifications
    #[arg(long, global = true)]
    no_notify: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a ride from a JSON lines fix feed
    Record {
        #[arg(short, long)]
        input: PathBuf,

        /// Also write every received fix to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Play the feed back at the pace it was recorded
        #[arg(long)]
        realtime: bool,

        /// Discard an unsaved session without asking
        #[arg(short, long)]
        yes: bool,
    },
    /// Archive the current ride
    Save,
    /// Discard the current ride
    Clear {
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the current ride and fuel figures
    Status,
    /// List the recorded points of the current ride, newest first
    Points {
        /// Only show this many of the latest points
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// List archived rides
    Sessions,
    /// Log a petrol refill, in liters
    Refuel { liters: String },
    /// Change the bike settings
    Settings {
        /// Tank capacity, liters
        #[arg(long)]
        tank: Option<String>,

        /// Average mileage, km/L
        #[arg(long)]
        mileage: Option<String>,

        /// Store directory to use from the next run on, saved to the config file
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Seconds below walking speed before the stop notification, saved to the config file
        #[arg(long)]
        stop_window: Option<u64>,
    },
}

fn open_store(dir: Option<PathBuf>) -> Box<dyn KeyValueStore> {
    let store = match dir {
        Some(dir) => FileKeyValueStore::new(dir),
        None => FileKeyValueStore::new_default(),
    };
    match store {
        Ok(store) => {
            info!("Using store at {:?}", store.storage_path());
            Box::new(store)
        }
        Err(e) => {
            error!("Could not open the store, nothing will be persisted: {}", e);
            Box::new(MemoryStore::new())
        }
    }
}

fn confirm_on_terminal(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn print_status(controller: &Controller) {
    let stats = controller.stats();
    let view = DashboardView::from(&stats);
    println!(
        "{} - {} points recorded",
        if stats.recording { "Recording" } else { "Idle" },
        stats.points
    );
    println!("{}", view.render_line());
}

fn record(
    controller: &mut Controller,
    input: PathBuf,
    output: Option<PathBuf>,
    realtime: bool,
    yes: bool,
) -> Result<(), RideError> {
    let source = JsonlPositionSource::new(&input).paced(realtime);
    controller.start(source.status(), |prompt| yes || confirm_on_terminal(prompt))?;
    RECORDING.store(true, Ordering::SeqCst);

    let (fix_tx, fix_rx) = mpsc::channel::<FixEvent>();

    // if we need to write an output file the collector sends each fix to both the
    // session and the writer channel
    let mut writer_handle = None;
    let fix_writer_tx = output.map(|output_file| {
        let (fix_writer_tx, fix_writer_rx) = mpsc::channel::<RawFix>();
        writer_handle = Some(thread::spawn(move || {
            writer::write_fixes(&output_file, fix_writer_rx)
        }));
        fix_writer_tx
    });
    let collector =
        thread::spawn(move || telemetry::collect_fixes(source, fix_tx, fix_writer_tx));

    let mut result = Ok(());
    loop {
        if STOP_REQUESTED.load(Ordering::SeqCst) {
            info!("Stop requested");
            break;
        }
        match fix_rx.recv_timeout(Duration::from_millis(TICK_MS)) {
            Ok(event) => {
                if let Err(e) = controller.handle_event(event) {
                    result = Err(e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => controller.tick(),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    controller.stop();
    RECORDING.store(false, Ordering::SeqCst);
    drop(fix_rx);

    match collector.join() {
        Ok(Ok(count)) => info!("Received {} fixes", count),
        Ok(Err(RideError::FixBroadcastError { .. })) => {}
        Ok(Err(e)) => warn!("Fix collection ended with an error: {}", e),
        Err(_) => error!("Fix collector thread panicked"),
    }
    if let Some(handle) = writer_handle {
        match handle.join() {
            Ok(Ok(count)) => info!("Wrote {} fixes", count),
            Ok(Err(e)) => error!("{}", e),
            Err(_) => error!("Fix writer thread panicked"),
        }
    }

    print_status(controller);
    result
}

fn run(args: Args) -> Result<(), RideError> {
    let config = AppConfig::from_local_file().unwrap_or_default();
    let store = open_store(args.store.or(config.store_dir.clone()));
    let notifier = LogNotifier::new(if args.no_notify {
        NotificationPermission::Denied
    } else {
        NotificationPermission::Granted
    });
    let mut controller = SessionController::new(store, SystemClock, notifier, &config);
    controller.subscribe(Box::new(LogDashboard::default()));

    match args.command {
        Commands::Record {
            input,
            output,
            realtime,
            yes,
        } => record(&mut controller, input, output, realtime, yes)?,
        Commands::Save => {
            let session = controller.save()?;
            println!("Session saved! ({}, {} points)", session.name, session.positions.len());
        }
        Commands::Clear { yes } => {
            controller.clear(|prompt| yes || confirm_on_terminal(prompt))?;
            println!("Recorded points cleared");
        }
        Commands::Status => print_status(&controller),
        Commands::Points { limit } => {
            print!("{}", render_points_table(controller.positions(), limit));
        }
        Commands::Sessions => {
            if controller.archived_sessions().is_empty() {
                println!("No saved sessions yet.");
            }
            for session in controller.archived_sessions() {
                println!(
                    "{}  {}  {:.2} km  {:.1} km/h  {:.0} m²  {} points",
                    session.id,
                    session.name,
                    session.stats.km,
                    session.stats.avg_kmh,
                    session.stats.area_m2,
                    session.positions.len()
                );
            }
        }
        Commands::Refuel { liters } => {
            controller.refuel_from_input(&liters)?;
            print_status(&controller);
        }
        Commands::Settings {
            tank,
            mileage,
            store_dir,
            stop_window,
        } => {
            if store_dir.is_some() || stop_window.is_some() {
                let mut config = config;
                if let Some(store_dir) = store_dir {
                    config.store_dir = Some(store_dir);
                }
                if let Some(stop_window) = stop_window {
                    config.stop_window_s = stop_window;
                }
                config.save()?;
                println!("Configuration saved");
            }
            if let Some(tank) = tank {
                controller.set_tank_capacity(parse_setting_input(&tank))?;
            }
            if let Some(mileage) = mileage {
                controller.set_avg_mileage(parse_setting_input(&mileage))?;
            }
            let fuel = controller.fuel();
            println!(
                "Tank capacity {:.1} L, average mileage {:.1} km/L",
                fuel.tank_capacity_l, fuel.avg_mileage_km_per_l
            );
        }
    }
    Ok(())
}

fn main() {
    let mut logger = colog::default_builder();
    logger.filter_level(if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
    logger.init();

    let args = Args::parse();
    // first Ctrl-C stops a running recording, anything else exits
    if let Err(e) = ctrlc::set_handler(move || {
        if RECORDING.load(Ordering::SeqCst) && !STOP_REQUESTED.swap(true, Ordering::SeqCst) {
            println!("Stopping recording...");
        } else {
            println!("Exiting...");
            std::process::exit(0);
        }
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    if let Err(e) = run(args) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
