//! # lintel-demo-app - a small application talking to the shell
//!
//! Registers an application menu and a status item with a running
//! `lintel-shell`, opens a surface on an in-process headless compositor,
//! feeds it a little synthetic input, and logs every event it receives
//! (including activation changes from the shell) until the run time is up.

use anyhow::{Context, Result};
use clap::Parser;
use lintel::channel::{MenuNode, StatusHandle, StatusItemPayload};
use lintel::client::{ClientEvent, DisplayClient, HeadlessCompositor, RawEvent, ShellClient};
use lintel::input::keymap::keycodes::{KEY_A, KEY_L};
use lintel::input::{ButtonState, KeyState, Point, RawInput};
use lintel::surface::{Size, SurfaceId};
use lintel::LintelConfig;
use log::{info, warn};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

const BTN_LEFT: u32 = 0x110;

#[derive(Parser)]
#[command(name = "lintel-demo-app")]
#[command(about = "Demo application for the Lintel shell")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/lintel/lintel.toml")]
    config: String,

    /// Shell socket to connect to (defaults to the configured one)
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Application name shown on the bar
    #[arg(short, long, default_value = "Demo")]
    name: String,

    /// How long to run (seconds)
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn app_menu(name: &str) -> MenuNode {
    MenuNode::new(name).with_children([
        MenuNode::new("File").with_children([
            MenuNode::new("New").with_key("Ctrl+N"),
            MenuNode::new("Open…").with_key("Ctrl+O"),
            MenuNode::new("Quit").with_key("Ctrl+Q"),
        ]),
        MenuNode::new("Edit").with_children([
            MenuNode::new("Undo").with_key("Ctrl+Z").disabled(),
            MenuNode::new("Copy").with_key("Ctrl+C"),
        ]),
    ])
}

/// Play a short scripted session on the headless compositor
fn drive(compositor: HeadlessCompositor) {
    let surface = SurfaceId(1);
    thread::sleep(Duration::from_millis(200));

    compositor.send(RawEvent::PointerEnter {
        surface,
        position: Point { x: 10.0, y: 10.0 },
    });
    compositor.send(RawEvent::KeyboardEnter { surface });
    for (time, state) in [(100, ButtonState::Pressed), (150, ButtonState::Released)] {
        compositor.send(RawEvent::Input(RawInput::Button {
            time,
            device: 1,
            button: BTN_LEFT,
            state,
        }));
    }
    for (time, keycode) in [(300, KEY_L), (400, KEY_A)] {
        compositor.send(RawEvent::Input(RawInput::Key {
            time,
            device: 2,
            keycode,
            state: KeyState::Pressed,
        }));
        compositor.send(RawEvent::Input(RawInput::Key {
            time: time + 50,
            device: 2,
            keycode,
            state: KeyState::Released,
        }));
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let config = LintelConfig::load(&cli.config).unwrap_or_else(|e| {
        info!("📝 Using default configuration ({})", e);
        LintelConfig::default()
    });
    let socket = cli.socket.unwrap_or_else(|| config.shell.socket_path.clone());

    let mut shell = ShellClient::connect(&socket, config.shell.max_message_bytes)
        .with_context(|| format!("Failed to connect to the shell at {}", socket.display()))?;
    shell.register_menu(app_menu(&cli.name))?;
    let status = StatusHandle(1);
    shell.register_status_item(status, StatusItemPayload::titled(&cli.name).with_icon("demo"))?;
    info!("📋 Registered menu and status item with the shell");

    let compositor = HeadlessCompositor::new();
    compositor.set_auto_configure(true);
    compositor.advertise_seat();
    let driver = compositor.clone();
    let script = thread::spawn(move || drive(driver));

    let mut client = DisplayClient::connect(|| compositor.connect(), &config)?;
    client.attach_shell(shell);
    let surface = client.create_surface(Size::new(640, 480))?;

    let end = Instant::now() + Duration::from_secs(cli.seconds);
    while Instant::now() < end && !client.is_disconnected() {
        let remaining = end.saturating_duration_since(Instant::now());
        for event in client.poll_events(remaining) {
            match event {
                ClientEvent::SurfaceConfigured { surface, size } => {
                    info!("🪟 {} configured at {}x{}", surface, size.width, size.height);
                    client.attach_buffer(surface)?;
                }
                ClientEvent::Activated(active) => {
                    info!("🎯 {} is {}", cli.name, if active { "active" } else { "inactive" });
                }
                ClientEvent::Input(input) => info!("⌨️ {:?}", input.kind),
                ClientEvent::SurfaceClosed(surface) => {
                    info!("Close requested for {}", surface);
                    client.destroy_surface(surface);
                }
                ClientEvent::ShellDisconnected => warn!("💔 Lost the shell channel"),
                ClientEvent::Disconnected => warn!("💔 Compositor went away"),
                other => info!("{:?}", other),
            }
        }
    }

    if let Some(shell) = client.shell_mut() {
        if let Err(e) = shell.unregister_status_item(status) {
            warn!("⚠️ Could not unregister status item: {}", e);
        }
    }
    client.destroy_surface(surface);
    if script.join().is_err() {
        warn!("⚠️ Input script panicked");
    }
    info!("👋 {} exiting", cli.name);
    Ok(())
}
