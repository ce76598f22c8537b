//! OpenArcade configuration tool: entry point.
//!
//! A command-line front end over the [`ConfigClient`] contract.  Every
//! subcommand connects, issues one or two commands, prints the result and
//! disconnects.
//!
//! # Usage
//!
//! ```text
//! openarcade-config [OPTIONS] <COMMAND>
//!
//! Commands:
//!   ports                                  List serial ports
//!   ping                                   Check that the backend answers
//!   list                                   Print every device as JSON
//!   get        <DEVICE>                    Print one device as JSON
//!   keycodes   <DEVICE>                    Resolved HID usages of the active mode
//!   set-mapping <DEVICE> <MODE> <CONTROL> <KEYCODE>
//!   map-button <DEVICE> <MODE> <BUTTON> <KIND> <INPUT>
//!   set-mode   <DEVICE> <MODE>
//!   touch      <DEVICE>                    Refresh last_seen
//!   serve                                  Answer the protocol on a serial port
//!   config                                 Print (or save) the effective settings
//!
//! Options:
//!   --backend <serial|local|emulated>
//!   --port    <PATH>     Serial port, e.g. /dev/ttyACM0 or COM3
//!   --baud    <N>        Baud rate [default: 115200]
//!   --store   <PATH>     Device store file for the local/emulated backends
//!   --config  <FILE>     Settings file [default: platform config dir]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable               | Flag          |
//! |------------------------|---------------|
//! | `OPENARCADE_BACKEND`   | `--backend`   |
//! | `OPENARCADE_PORT`      | `--port`      |
//! | `OPENARCADE_BAUD`      | `--baud`      |
//! | `OPENARCADE_STORE`     | `--store`     |
//! | `OPENARCADE_CONFIG`    | `--config`    |
//! | `OPENARCADE_LOG_LEVEL` | `--log-level` |
//!
//! Flags win over the environment, which wins over the settings file.
//! `RUST_LOG` wins over everything for log filtering.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use openarcade_config::infrastructure::emulator::{serve_device, serve_stream};
use openarcade_config::infrastructure::storage::config::{
    config_file_path, load_config, load_config_from, save_config_to, AppConfig, Backend,
};
use openarcade_config::infrastructure::transport::{duplex::DEFAULT_CAPACITY, list_ports};
use openarcade_config::{
    ByteTransport, ClientOptions, ConfigClient, DeviceStore, DuplexTransport, FileSlot,
    LocalConfigClient, MapButtonUseCase, SerialConfigClient, SerialTransport,
};
use openarcade_core::keymap::resolve_keycode_str;
use openarcade_core::{InputKind, MappingEntry, TableCatalog};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Configure OpenArcade controllers over serial, or against a local store.
#[derive(Debug, Parser)]
#[command(name = "openarcade-config", version)]
struct Cli {
    /// Which backend answers the commands.
    #[arg(long, value_enum, env = "OPENARCADE_BACKEND")]
    backend: Option<BackendArg>,

    /// Serial port of the controller.  Defaults to the first USB serial port.
    #[arg(long, env = "OPENARCADE_PORT")]
    port: Option<String>,

    #[arg(long, env = "OPENARCADE_BAUD")]
    baud: Option<u32>,

    /// Device store file used by the local and emulated backends.
    #[arg(long, env = "OPENARCADE_STORE")]
    store: Option<PathBuf>,

    /// Settings file to load instead of the platform default.
    #[arg(long, env = "OPENARCADE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "OPENARCADE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Serial,
    Local,
    Emulated,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Serial => Backend::Serial,
            BackendArg::Local => Backend::Local,
            BackendArg::Emulated => Backend::Emulated,
        }
    }
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// List the serial ports present on this machine.
    Ports,
    /// Check that the backend answers.
    Ping,
    /// Print every known device as JSON.
    List,
    /// Print one device as JSON.
    Get { device: String },
    /// Print the HID usage each control emits in the active mode.
    Keycodes { device: String },
    /// Store a raw keycode (`HID_KEY_A`, `0x04` or `4`) for a control.
    SetMapping {
        device: String,
        mode: String,
        control: String,
        keycode: String,
    },
    /// Map a layout button to a keyboard, gamepad or analog input.
    MapButton {
        device: String,
        mode: String,
        button: String,
        kind: InputKind,
        input: String,
    },
    /// Make a mode the active one.
    SetMode { device: String, mode: String },
    /// Refresh a device's last-seen timestamp.
    Touch { device: String },
    /// Act as a controller: answer the protocol on a serial port from the
    /// device store until the link closes or Ctrl+C.
    Serve,
    /// Print the effective settings as TOML.
    Config {
        /// Also write them to the settings file.
        #[arg(long)]
        save: bool,
    },
}

impl Cli {
    /// Loads the settings file and layers the flags on top.
    fn resolve_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            None => load_config().unwrap_or_else(|e| {
                eprintln!("openarcade-config: using default settings ({e})");
                AppConfig::default()
            }),
        };

        if let Some(backend) = self.backend {
            config.client.backend = backend.into();
        }
        if let Some(port) = &self.port {
            config.serial.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(store) = &self.store {
            config.local.store_path = Some(store.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.log_level = level.clone();
        }
        Ok(config)
    }
}

// ── Backend wiring ────────────────────────────────────────────────────────────

fn open_store(config: &AppConfig) -> anyhow::Result<DeviceStore> {
    let path = config
        .local
        .resolved_store_path()
        .context("no device store path; pass --store")?;
    info!("device store: {}", path.display());
    Ok(DeviceStore::open(Box::new(FileSlot::new(path))))
}

/// Builds the client the configuration asks for.
fn build_client(config: &AppConfig) -> anyhow::Result<Arc<dyn ConfigClient>> {
    let client: Arc<dyn ConfigClient> = match config.client.backend {
        Backend::Serial => {
            let transport =
                SerialTransport::new(config.serial.port.clone(), config.serial.baud_rate);
            Arc::new(SerialConfigClient::new(
                Arc::new(transport),
                ClientOptions::from(&config.serial),
            ))
        }
        Backend::Local => Arc::new(LocalConfigClient::new(
            open_store(config)?.into_shared(),
            config.local.default_device_id.clone(),
            config.local.simulated_latency(),
        )),
        Backend::Emulated => {
            let store = open_store(config)?.into_shared();
            let (transport, device_end) = DuplexTransport::pair(DEFAULT_CAPACITY);
            tokio::spawn(async move {
                if let Err(e) = serve_stream(device_end, store).await {
                    warn!("emulator stopped: {e}");
                }
            });
            Arc::new(SerialConfigClient::new(
                Arc::new(transport),
                ClientOptions::from(&config.serial),
            ))
        }
    };
    Ok(client)
}

/// Inputs offered by `map-button`.  Keyboard keys need no entry here.
fn input_catalog() -> TableCatalog {
    let buttons = [
        ("xb_button_a", "A Button"),
        ("xb_button_b", "B Button"),
        ("xb_button_x", "X Button"),
        ("xb_button_y", "Y Button"),
        ("xb_dpad_up", "D-Pad Up"),
        ("xb_dpad_down", "D-Pad Down"),
        ("xb_dpad_left", "D-Pad Left"),
        ("xb_dpad_right", "D-Pad Right"),
        ("xb_left_bumper", "Left Bumper (LB)"),
        ("xb_right_bumper", "Right Bumper (RB)"),
        ("xb_left_stick_button", "Left Stick Click"),
        ("xb_right_stick_button", "Right Stick Click"),
        ("xb_menu", "Menu (Start)"),
        ("xb_view", "View (Back)"),
        ("xb_home", "Home/Xbox"),
    ];
    let axes = [
        ("xb_left_trigger", "Left Trigger (LT)"),
        ("xb_right_trigger", "Right Trigger (RT)"),
        ("xb_left_stick_x", "Left Stick X-Axis"),
        ("xb_left_stick_y", "Left Stick Y-Axis"),
        ("xb_right_stick_x", "Right Stick X-Axis"),
        ("xb_right_stick_y", "Right Stick Y-Axis"),
    ];

    let catalog = buttons
        .into_iter()
        .fold(TableCatalog::new(), |c, (input, label)| {
            c.with(InputKind::Gamepad, input, label)
        });
    axes.into_iter().fold(catalog, |c, (input, label)| {
        c.with_analog(InputKind::Gamepad, input, label)
            .with(InputKind::Analog, input, label)
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── Subcommands ───────────────────────────────────────────────────────────────

async fn run_client_command(client: Arc<dyn ConfigClient>, command: CliCommand) -> anyhow::Result<()> {
    match command {
        CliCommand::Ping => {
            client.ping().await.context("ping failed")?;
            println!("pong");
        }
        CliCommand::List => {
            let devices = client.list_devices().await.context("list_devices failed")?;
            print_json(&devices)?;
        }
        CliCommand::Get { device } => {
            match client.get_device(&device).await.context("get_device failed")? {
                Some(found) => print_json(&found)?,
                None => bail!("device {device} not found"),
            }
        }
        CliCommand::Keycodes { device } => {
            let Some(found) = client.get_device(&device).await.context("get_device failed")? else {
                bail!("device {device} not found");
            };
            print_json(&found.active_keycodes())?;
        }
        CliCommand::SetMapping {
            device,
            mode,
            control,
            keycode,
        } => {
            if resolve_keycode_str(&keycode).is_none() {
                bail!("unknown keycode: {keycode}");
            }
            client
                .set_mapping(&device, &mode, &control, MappingEntry::Keycode(keycode))
                .await
                .context("set_mapping failed")?;
            println!("ok");
        }
        CliCommand::MapButton {
            device,
            mode,
            button,
            kind,
            input,
        } => {
            let use_case = MapButtonUseCase::new(Arc::clone(&client), Arc::new(input_catalog()));
            let mapped = use_case
                .map_button(&device, &mode, &button, kind, &input)
                .await
                .context("map_button failed")?;
            print_json(&mapped.binding)?;
            info!("{button} -> control {}", mapped.control_id);
        }
        CliCommand::SetMode { device, mode } => {
            client
                .set_active_mode(&device, &mode)
                .await
                .context("set_active_mode failed")?;
            println!("ok");
        }
        CliCommand::Touch { device } => {
            client.touch(&device).await.context("set_last_seen failed")?;
            println!("ok");
        }
        other => bail!("{other:?} does not talk to a backend"),
    }
    Ok(())
}

async fn serve(config: &AppConfig) -> anyhow::Result<()> {
    let store = open_store(config)?.into_shared();
    let transport = SerialTransport::new(config.serial.port.clone(), config.serial.baud_rate);
    let handle = transport.open().await.context("failed to open serial port")?;
    info!("serving device store on {}", handle.label);

    tokio::select! {
        result = serve_device(handle.reader, handle.writer, store) => {
            let served = result.context("serial link failed")?;
            info!("served {served} request(s)");
        }
        _ = tokio::signal::ctrl_c() => info!("Ctrl+C received, stopping"),
    }
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    // `RUST_LOG` wins; otherwise the configured level.  Logs go to stderr so
    // JSON on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        CliCommand::Ports => {
            for port in list_ports().context("failed to enumerate serial ports")? {
                let description = port.description.unwrap_or_default();
                println!("{}\t{}\t{}", port.name, port.kind, description);
            }
            Ok(())
        }
        CliCommand::Serve => serve(&config).await,
        CliCommand::Config { save } => {
            print!("{}", toml::to_string_pretty(&config)?);
            if save {
                let path = match &cli.config {
                    Some(path) => path.clone(),
                    None => config_file_path()?,
                };
                save_config_to(&config, &path)
                    .with_context(|| format!("failed to save settings to {}", path.display()))?;
                info!("settings saved to {}", path.display());
            }
            Ok(())
        }
        command => {
            let client = build_client(&config)?;
            client.connect().await.context("failed to connect")?;
            let result = run_client_command(Arc::clone(&client), command).await;
            if let Err(e) = client.disconnect().await {
                warn!("disconnect failed: {e}");
            }
            result
        }
    }
}
