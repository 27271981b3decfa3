//! Rendering seam.
//!
//! Whatever visualises a run (a plot, a terminal dashboard, a log line)
//! receives snapshots through [`Renderer`].

use crate::snapshot::ResultSnapshot;
use crossbeam::channel::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Consumer of periodic result snapshots.
pub trait Renderer: Send {
    fn render(&mut self, snapshot: &ResultSnapshot);
}

/// Logs a one-line summary per snapshot.
#[derive(Debug, Default)]
pub struct LogRenderer {
    last_total: usize,
}

impl Renderer for LogRenderer {
    fn render(&mut self, snapshot: &ResultSnapshot) {
        if snapshot.is_empty() || snapshot.total == self.last_total {
            return;
        }
        self.last_total = snapshot.total;

        info!(
            total = snapshot.total,
            mean = ?snapshot.mean,
            std_dev = ?snapshot.std_dev,
            min = ?snapshot.min,
            max = ?snapshot.max,
            workers = snapshot.per_worker.len(),
            "Results"
        );
        for (worker, count) in &snapshot.per_worker {
            debug!(worker = %worker, count, "Worker completions");
        }
    }
}

/// Run `renderer` on its own thread until the snapshot sender disconnects.
/// The renderer is handed back on join.
pub fn spawn_renderer<R>(mut renderer: R, snapshots: Receiver<Arc<ResultSnapshot>>) -> JoinHandle<R>
where
    R: Renderer + 'static,
{
    thread::Builder::new()
        .name("renderer".into())
        .spawn(move || {
            for snapshot in snapshots {
                renderer.render(&snapshot);
            }
            renderer
        })
        .expect("failed to spawn renderer thread")
}
