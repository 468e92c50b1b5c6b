//! Command-line interface and REPL
//!
//! Drives the coordinator interactively: list and toggle macros, resolve
//! conflicts, reorder groups and simulate incoming MIDI on the console
//! backend.

use crate::backend::ConsoleBackend;
use crate::bundle::ExportBundle;
use crate::coordinator::{
    ActivationOutcome, CategoryMode, Coordinator, DeactivationReport, GroupState, PendingResolution,
    Resolution,
};
use crate::midi::MidiEvent;
use crate::ports::{self, PortWatcher};
use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;
use tracing::debug;

/// A parsed REPL line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List { category: Option<String> },
    Categories,
    Active,
    Activate(String),
    Deactivate(String),
    CategoryOn { id: String, mode: CategoryMode },
    CategoryOff(String),
    Resolve(Resolution),
    Move { key: String, category: String, before: Option<String> },
    Reorder { category: String, dragged: String, target: String },
    Delete(String),
    Fire(MidiEvent),
    Ports,
    Export(String),
    Import(String),
    Help,
    Quit,
}

fn arg<'a>(parts: &[&'a str], index: usize, what: &str) -> Result<&'a str, String> {
    parts
        .get(index)
        .copied()
        .ok_or_else(|| format!("missing {}", what))
}

fn number(parts: &[&str], index: usize, what: &str, max: u8) -> Result<u8, String> {
    let raw = arg(parts, index, what)?;
    match raw.parse::<u8>() {
        Ok(v) if v <= max => Ok(v),
        _ => Err(format!("{} must be 0-{}, got '{}'", what, max, raw)),
    }
}

impl Command {
    /// Parse one line; `Ok(None)` for blank input
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&head) = parts.first() else {
            return Ok(None);
        };

        let command = match head {
            "list" | "ls" => Command::List {
                category: parts.get(1).map(|s| s.to_string()),
            },
            "categories" => Command::Categories,
            "active" => Command::Active,
            "activate" | "on" => Command::Activate(arg(&parts, 1, "macro id")?.to_string()),
            "deactivate" | "off" => Command::Deactivate(arg(&parts, 1, "macro id")?.to_string()),
            "category" => {
                let id = arg(&parts, 2, "category id")?.to_string();
                match arg(&parts, 1, "on|off")? {
                    "on" => {
                        let mode = match parts.get(3).copied() {
                            None | Some("additive") => CategoryMode::Additive,
                            Some("exclusive") => CategoryMode::Exclusive,
                            Some(other) => return Err(format!("unknown mode '{}'", other)),
                        };
                        Command::CategoryOn { id, mode }
                    }
                    "off" => Command::CategoryOff(id),
                    other => return Err(format!("expected on|off, got '{}'", other)),
                }
            }
            "resolve" => Command::Resolve(match arg(&parts, 1, "replace|keep|cancel")? {
                "replace" => Resolution::Replace,
                "keep" => Resolution::KeepExisting,
                "cancel" => Resolution::Cancel,
                other => return Err(format!("unknown resolution '{}'", other)),
            }),
            "move" => {
                let key = arg(&parts, 1, "group key")?.to_string();
                let category = arg(&parts, 2, "category id")?.to_string();
                let before = match parts.get(3).copied() {
                    None => None,
                    Some("before") => Some(arg(&parts, 4, "drop target")?.to_string()),
                    Some(other) => return Err(format!("expected 'before', got '{}'", other)),
                };
                Command::Move {
                    key,
                    category,
                    before,
                }
            }
            "reorder" => Command::Reorder {
                category: arg(&parts, 1, "category id")?.to_string(),
                dragged: arg(&parts, 2, "dragged key")?.to_string(),
                target: arg(&parts, 3, "target key")?.to_string(),
            },
            "delete" | "rm" => Command::Delete(arg(&parts, 1, "macro id")?.to_string()),
            "fire" => {
                let channel = number(&parts, 2, "channel", 15)?;
                let event = match arg(&parts, 1, "note|off|cc")? {
                    "note" => MidiEvent::NoteOn {
                        channel,
                        note: number(&parts, 3, "note", 127)?,
                        velocity: if parts.len() > 4 {
                            number(&parts, 4, "velocity", 127)?
                        } else {
                            100
                        },
                    },
                    "off" => MidiEvent::NoteOff {
                        channel,
                        note: number(&parts, 3, "note", 127)?,
                        velocity: 0,
                    },
                    "cc" => MidiEvent::ControlChange {
                        channel,
                        controller: number(&parts, 3, "controller", 127)?,
                        value: number(&parts, 4, "value", 127)?,
                    },
                    other => return Err(format!("unknown event kind '{}'", other)),
                };
                Command::Fire(event)
            }
            "ports" => Command::Ports,
            "export" => Command::Export(arg(&parts, 1, "file")?.to_string()),
            "import" => Command::Import(arg(&parts, 1, "file")?.to_string()),
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command '{}' (try 'help')", other)),
        };
        Ok(Some(command))
    }
}

const HELP: &str = "\
  list [category]                     macros, grouped and in display order
  categories                          categories and whether they are fully active
  active                              active macro ids
  activate <id>                       activate a macro's group (or a group key)
  deactivate <id>                     deactivate a macro's group
  category on <id> [exclusive]        activate a category
  category off <id>                   deactivate a category
  resolve replace|keep|cancel         answer the pending conflict
  move <key> <category> [before <k>]  move a group to another category
  reorder <category> <dragged> <tgt>  drag a group onto another
  delete <id>                         delete a macro
  fire note|off <ch> <note> [vel]     simulate an incoming note
  fire cc <ch> <cc> <value>           simulate an incoming control change
  ports                               MIDI input ports
  export <file> / import <file>       bundle export and import
  quit                                leave";

/// Interactive session state
pub struct Repl {
    coordinator: Arc<Coordinator>,
    backend: Arc<ConsoleBackend>,
    ports: Option<PortWatcher>,
    client_name: String,
    pending: Option<PendingResolution>,
}

impl Repl {
    pub fn new(
        coordinator: Arc<Coordinator>,
        backend: Arc<ConsoleBackend>,
        ports: Option<PortWatcher>,
        client_name: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            backend,
            ports,
            client_name: client_name.into(),
            pending: None,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        println!(
            "{} {}",
            "MIDI Macros".bold().cyan(),
            "- type 'help' for commands".dimmed()
        );

        loop {
            let prompt = if self.pending.is_some() {
                "macros (conflict)> "
            } else {
                "macros> "
            };
            let line = match rl.readline(prompt) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            };
            let _ = rl.add_history_entry(line.as_str());

            let command = match Command::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    println!("{}", e.red());
                    continue;
                }
            };
            if command == Command::Quit {
                break;
            }
            if let Err(e) = self.execute(command).await {
                println!("{} {:#}", "Error:".red().bold(), e);
            }
        }

        Ok(())
    }

    pub async fn execute(&mut self, command: Command) -> Result<()> {
        debug!("REPL command: {:?}", command);
        match command {
            Command::List { category } => self.list(category).await?,
            Command::Categories => {
                for category in self.coordinator.categories().await {
                    let state = if self.coordinator.is_category_active(&category.id).await {
                        "active".green()
                    } else {
                        "".normal()
                    };
                    println!(
                        "  {} {} {} {}",
                        category.id.bold(),
                        category.name,
                        category.color.dimmed(),
                        state
                    );
                }
            }
            Command::Active => {
                let ids = self.coordinator.active_ids().await;
                if ids.is_empty() {
                    println!("  {}", "nothing active".dimmed());
                } else {
                    println!("  {}", ids.join(", ").green());
                }
            }
            Command::Activate(id) => {
                let outcome = if self.coordinator.get_macro(&id).await.is_some() {
                    self.coordinator.activate(&id).await?
                } else {
                    self.coordinator.activate_group(&id).await?
                };
                self.show_outcome(outcome).await?;
            }
            Command::Deactivate(id) => {
                let report = if self.coordinator.get_macro(&id).await.is_some() {
                    self.coordinator.deactivate(&id).await?
                } else {
                    self.coordinator.deactivate_group(&id).await?
                };
                show_deactivation(&report);
            }
            Command::CategoryOn { id, mode } => {
                let outcome = self.coordinator.activate_category(&id, mode).await?;
                self.show_outcome(outcome).await?;
            }
            Command::CategoryOff(id) => {
                let report = self.coordinator.deactivate_category(&id).await?;
                show_deactivation(&report);
            }
            Command::Resolve(resolution) => match self.pending.take() {
                Some(pending) => {
                    let outcome = self.coordinator.resolve(pending, resolution).await?;
                    self.show_outcome(outcome).await?;
                }
                None => println!("{}", "No conflict is pending".yellow()),
            },
            Command::Move {
                key,
                category,
                before,
            } => {
                self.coordinator
                    .move_to_category(&key, &category, before.as_deref())
                    .await?;
                println!("  moved {} to {}", key.bold(), category.bold());
            }
            Command::Reorder {
                category,
                dragged,
                target,
            } => {
                if self.coordinator.reorder(&category, &dragged, &target).await? {
                    let order = self.coordinator.ordered_group_keys(&category).await;
                    println!("  {}", order.join(" → "));
                } else {
                    println!("  {}", "order unchanged".dimmed());
                }
            }
            Command::Delete(id) => {
                let report = self.coordinator.delete_macro(&id).await?;
                show_deactivation(&report);
                println!("  deleted {}", id.bold());
            }
            Command::Fire(event) => {
                let fired = self.backend.fire(event).await;
                if fired.is_empty() {
                    println!("  {} → {}", event, "no macro".dimmed());
                } else {
                    println!("  {} → {}", event, fired.join(", ").green());
                }
            }
            Command::Ports => match &self.ports {
                Some(watcher) => {
                    println!("\n{}", "=== MIDI Input Ports ===".bold().cyan());
                    ports::print_ports(&watcher.ports());
                }
                None => ports::list_ports_formatted(&self.client_name),
            },
            Command::Export(path) => {
                let bundle = self.coordinator.export_bundle().await;
                bundle.save_to_file(&path).await?;
                println!("  exported {} macro(s) to {}", bundle.macros.len(), path);
            }
            Command::Import(path) => {
                let bundle = ExportBundle::load_from_file(&path).await?;
                let report = self.coordinator.import_bundle(bundle).await?;
                println!(
                    "  macros {} imported / {} skipped, categories {} / {}, active {} / {}",
                    report.macros.imported,
                    report.macros.skipped,
                    report.categories.imported,
                    report.categories.skipped,
                    report.active.imported,
                    report.active.skipped
                );
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
        Ok(())
    }

    async fn list(&self, category: Option<String>) -> Result<()> {
        let categories = match category {
            Some(id) => vec![id],
            None => self
                .coordinator
                .categories()
                .await
                .into_iter()
                .map(|c| c.id)
                .collect(),
        };

        for category_id in categories {
            println!("{}", category_id.bold().underline());
            for key in self.coordinator.ordered_group_keys(&category_id).await {
                let marker = match self.coordinator.group_state(&key).await {
                    GroupState::Active => "●".green(),
                    GroupState::PartiallyActive => "◐".yellow(),
                    GroupState::PendingResolution => "?".magenta(),
                    GroupState::Inactive => "○".dimmed(),
                };
                for member in self.coordinator.group_members(&key).await {
                    let role = member
                        .role
                        .filter(|r| r.is_encoder())
                        .map(|r| format!(" [{}]", r))
                        .unwrap_or_default();
                    println!(
                        "  {} {:<20} {}{}",
                        marker,
                        member.display_name(),
                        member.trigger.to_string().dimmed(),
                        role
                    );
                }
            }
        }
        Ok(())
    }

    async fn show_outcome(&mut self, outcome: ActivationOutcome) -> Result<()> {
        match outcome {
            ActivationOutcome::Activated(report) => {
                if !report.deactivated.is_empty() {
                    println!("  {} {}", "off:".yellow(), report.deactivated.join(", "));
                }
                if !report.activated.is_empty() {
                    println!("  {} {}", "on:".green(), report.activated.join(", "));
                }
                for (id, reason) in &report.failed {
                    println!("  {} {}: {}", "failed:".red(), id, reason);
                }
                for (key, e) in &report.rejected {
                    println!("  {} {}: {}", "rejected:".red(), key, e);
                }
            }
            ActivationOutcome::AlreadyActive => println!("  {}", "already active".dimmed()),
            ActivationOutcome::Pending(pending) => {
                println!("  {}", "Trigger conflict with active macros:".yellow().bold());
                for conflict in pending.conflicts() {
                    println!("    {} {}", conflict.display_name().bold(), conflict.trigger);
                }
                println!(
                    "  {}",
                    "resolve replace | resolve keep | resolve cancel".dimmed()
                );
                // Only one conflict is answered at a time; drop the older one
                if let Some(previous) = self.pending.take() {
                    if previous.token() != pending.token() {
                        debug!("Cancelling superseded resolution #{}", previous.token());
                        self.coordinator.resolve(previous, Resolution::Cancel).await?;
                    }
                }
                self.pending = Some(pending);
            }
            ActivationOutcome::KeptExisting => println!("  {}", "kept existing macros".dimmed()),
            ActivationOutcome::Cancelled => println!("  {}", "cancelled".dimmed()),
            ActivationOutcome::Rejected(e) => println!("  {} {}", "rejected:".red(), e),
        }
        Ok(())
    }
}

fn show_deactivation(report: &DeactivationReport) {
    if report.deactivated.is_empty() {
        println!("  {}", "nothing to deactivate".dimmed());
        return;
    }
    println!("  {} {}", "off:".yellow(), report.deactivated.join(", "));
    for (id, reason) in &report.cancel_failed {
        println!("  {} {}: {}", "cancel failed:".red(), id, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MacroDefinition, MacroTrigger};
    use crate::store::MemoryStorage;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("   ").unwrap(), None);
        assert_eq!(
            Command::parse("activate pad-1").unwrap(),
            Some(Command::Activate("pad-1".to_string()))
        );
        assert_eq!(
            Command::parse("category on live exclusive").unwrap(),
            Some(Command::CategoryOn {
                id: "live".to_string(),
                mode: CategoryMode::Exclusive
            })
        );
        assert_eq!(
            Command::parse("resolve keep").unwrap(),
            Some(Command::Resolve(Resolution::KeepExisting))
        );
        assert_eq!(
            Command::parse("move enc live before pad").unwrap(),
            Some(Command::Move {
                key: "enc".to_string(),
                category: "live".to_string(),
                before: Some("pad".to_string())
            })
        );
        assert_eq!(
            Command::parse("fire cc 1 10 65").unwrap(),
            Some(Command::Fire(MidiEvent::ControlChange {
                channel: 1,
                controller: 10,
                value: 65
            }))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("activate").is_err());
        assert!(Command::parse("resolve maybe").is_err());
        assert!(Command::parse("fire note 16 60").is_err());
        assert!(Command::parse("fire cc 0 200 1").is_err());
        assert!(Command::parse("dance").is_err());
    }

    #[tokio::test]
    async fn test_conflict_flow_through_repl() {
        let backend = Arc::new(ConsoleBackend::new("console"));
        let coordinator = Arc::new(
            Coordinator::load(Arc::new(MemoryStorage::new()), backend.clone())
                .await
                .unwrap(),
        );
        coordinator
            .save_macro(MacroDefinition::new("a", MacroTrigger::note_on(0, 36)))
            .await
            .unwrap();
        coordinator
            .save_macro(MacroDefinition::new("b", MacroTrigger::note_on(0, 36)))
            .await
            .unwrap();

        let mut repl = Repl::new(coordinator.clone(), backend.clone(), None, "test");
        repl.execute(Command::Activate("a".to_string())).await.unwrap();
        repl.execute(Command::Activate("b".to_string())).await.unwrap();
        assert!(repl.pending.is_some());

        repl.execute(Command::Resolve(Resolution::Replace)).await.unwrap();
        assert!(repl.pending.is_none());
        assert_eq!(coordinator.active_ids().await, vec!["b"]);

        let fired = backend
            .fire(MidiEvent::NoteOn {
                channel: 0,
                note: 36,
                velocity: 100,
            })
            .await;
        assert_eq!(fired, vec!["b"]);
    }

    #[tokio::test]
    async fn test_new_conflict_supersedes_pending_one() {
        let backend = Arc::new(ConsoleBackend::new("console"));
        let coordinator = Arc::new(
            Coordinator::load(Arc::new(MemoryStorage::new()), backend.clone())
                .await
                .unwrap(),
        );
        for id in ["a", "b", "c"] {
            coordinator
                .save_macro(MacroDefinition::new(id, MacroTrigger::note_on(0, 36)))
                .await
                .unwrap();
        }

        let mut repl = Repl::new(coordinator.clone(), backend, None, "test");
        repl.execute(Command::Activate("a".to_string())).await.unwrap();
        repl.execute(Command::Activate("b".to_string())).await.unwrap();
        repl.execute(Command::Activate("b".to_string())).await.unwrap();
        let first = repl.pending.as_ref().unwrap().token();
        assert_eq!(coordinator.pending_tokens().await, vec![first]);

        repl.execute(Command::Activate("c".to_string())).await.unwrap();
        let second = repl.pending.as_ref().unwrap().token();
        assert_ne!(first, second);
        assert_eq!(coordinator.pending_tokens().await, vec![second]);
        assert_eq!(coordinator.group_state("b").await, GroupState::Inactive);

        repl.execute(Command::List { category: None }).await.unwrap();
    }
}
