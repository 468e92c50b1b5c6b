//! MIDI input port discovery
//!
//! Read-only: the engine never opens a port itself, the execution backend
//! does. The list is refreshed periodically so the UI can show which
//! controllers are plugged in.

use anyhow::Result;
use colored::*;
use midir::MidiInput;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub index: usize,
    pub name: String,
    pub is_virtual: bool,
}

/// Enumerate MIDI input ports
pub fn discover_input_ports(client_name: &str) -> Result<Vec<PortInfo>> {
    let midi_in = MidiInput::new(client_name)?;

    let mut port_infos = Vec::new();
    for (index, port) in midi_in.ports().iter().enumerate() {
        if let Ok(name) = midi_in.port_name(port) {
            let is_virtual = is_virtual_port(&name);
            port_infos.push(PortInfo {
                index,
                name,
                is_virtual,
            });
        }
    }

    Ok(port_infos)
}

fn is_virtual_port(name: &str) -> bool {
    name.contains("Virtual") || name.contains("loopMIDI") || name.contains("IAC")
}

/// Print the input ports
pub fn list_ports_formatted(client_name: &str) {
    println!("\n{}", "=== Available MIDI Input Ports ===".bold().cyan());

    match discover_input_ports(client_name) {
        Ok(inputs) => print_ports(&inputs),
        Err(e) => println!("  {} {}", "Port discovery failed:".red(), e),
    }

    println!();
}

pub fn print_ports(ports: &[PortInfo]) {
    if ports.is_empty() {
        println!("  {}", "No input ports found".dimmed());
        return;
    }
    for port in ports {
        let marker = if port.is_virtual {
            "[VIRTUAL]".yellow()
        } else {
            "[PHYSICAL]".green()
        };
        println!("  {} {} {}", format!("{:>2}", port.index).dimmed(), marker, port.name);
    }
}

type Discover = Arc<dyn Fn() -> Result<Vec<PortInfo>> + Send + Sync>;

/// Background task keeping the port list current
pub struct PortWatcher {
    rx: watch::Receiver<Vec<PortInfo>>,
    handle: JoinHandle<()>,
}

impl PortWatcher {
    /// Poll midir every `period`
    pub fn spawn(client_name: impl Into<String>, period: Duration) -> Self {
        let client_name = client_name.into();
        Self::spawn_with(period, move || discover_input_ports(&client_name))
    }

    /// Poll a custom discovery function every `period`
    pub fn spawn_with<F>(period: Duration, discover: F) -> Self
    where
        F: Fn() -> Result<Vec<PortInfo>> + Send + Sync + 'static,
    {
        let discover: Discover = Arc::new(discover);
        let (tx, rx) = watch::channel(Vec::new());

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut failures = 0usize;

            loop {
                ticker.tick().await;

                // midir enumeration talks to the OS MIDI service
                let discover = discover.clone();
                let ports = match tokio::task::spawn_blocking(move || discover()).await {
                    Ok(Ok(ports)) => {
                        failures = 0;
                        ports
                    }
                    Ok(Err(e)) => {
                        failures += 1;
                        if failures == 1 {
                            warn!("MIDI port discovery failed: {}", e);
                        } else {
                            debug!("MIDI port discovery failed ({}x): {}", failures, e);
                        }
                        continue;
                    }
                    Err(e) => {
                        warn!("MIDI port discovery task panicked: {}", e);
                        continue;
                    }
                };

                tx.send_if_modified(|current| {
                    if *current == ports {
                        return false;
                    }
                    log_changes(current, &ports);
                    *current = ports;
                    true
                });

                if tx.is_closed() {
                    debug!("Port watcher has no receivers left, stopping");
                    break;
                }
            }
        });

        Self { rx, handle }
    }

    /// Latest known port list
    pub fn ports(&self) -> Vec<PortInfo> {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<PortInfo>> {
        self.rx.clone()
    }
}

impl Drop for PortWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn log_changes(before: &[PortInfo], after: &[PortInfo]) {
    for port in after.iter().filter(|p| !before.iter().any(|b| b.name == p.name)) {
        info!("🔌 MIDI input connected: {}", port.name);
    }
    for port in before.iter().filter(|b| !after.iter().any(|p| p.name == b.name)) {
        info!("🔌 MIDI input disconnected: {}", port.name);
    }
}
