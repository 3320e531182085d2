use std::io::{self, Write};

use anyhow::bail;

use crate::state::RoleTableState;
use crate::sync::{Backfill, BackfillEvent, BackfillMode};

use super::{confirm_action, open_store};

/// Single-line progress counter on stderr.
struct Progress {
    total: u64,
    done: u64,
}

impl Progress {
    fn new(total: u64) -> Self {
        let progress = Self { total, done: 0 };
        progress.draw();
        progress
    }

    fn tick(&mut self) {
        self.done += 1;
        self.draw();
    }

    fn draw(&self) {
        let width = self.total.to_string().len();
        eprint!(
            "\rMigrating user roles  {:>width$}/{}",
            self.done,
            self.total,
            width = width
        );
        let _ = io::stderr().flush();
    }

    /// Ends the current line so other output does not overwrite it.
    fn interrupt(&self) {
        eprintln!();
    }
}

pub fn run_migrate(data_dir: String, preserve: bool, yes: bool) -> anyhow::Result<()> {
    let (settings, store) = open_store(&data_dir)?;

    if RoleTableState::new(&store).needs_install()? {
        bail!("User roles table is not installed. Run 'roletable install' first.");
    }

    let mode = if preserve {
        BackfillMode::Preserve
    } else {
        BackfillMode::Truncate
    };

    if mode == BackfillMode::Truncate
        && !confirm_action("Truncate the user roles table before migrating?", yes)?
    {
        println!("Migration cancelled.");
        return Ok(());
    }

    let mut progress: Option<Progress> = None;
    for event in Backfill::new(&store, &settings, mode) {
        match event? {
            BackfillEvent::Message(message) => {
                if let Some(bar) = &progress {
                    bar.interrupt();
                }
                println!("{message}");
            }
            BackfillEvent::Start { total } => progress = Some(Progress::new(total)),
            BackfillEvent::Progress { .. } => {
                if let Some(bar) = progress.as_mut() {
                    bar.tick();
                }
            }
            BackfillEvent::Finish { message, .. } => {
                if let Some(bar) = progress.take() {
                    bar.interrupt();
                }
                println!("{message}");
            }
        }
    }

    Ok(())
}
