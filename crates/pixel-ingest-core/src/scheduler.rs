use crate::codec::{Codec, Dimensions};
use crate::config::{FailurePolicy, IngestConfig};
use crate::error::{CodecError, IngestError, Result};
use crate::grid::PixelGrid;
use crate::normalize::normalize;
use crate::task::{DecodeTask, Sink, TaskStage};
use std::any::Any;
use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, mpsc};
use std::thread;
use tracing::{debug, info, info_span, instrument, trace, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Where a successfully decoded grid ended up.
#[derive(Debug)]
pub enum Delivery {
    /// Handed to the task's sink.
    Sink,
    /// Task had no sink; the grid is returned here.
    Grid(PixelGrid),
    /// Decoded, but not delivered because another task in the batch failed
    /// under [`FailurePolicy::AllOrNothing`].
    Withheld,
}

/// Result of one task, keyed by its label.
#[derive(Debug)]
pub struct TaskReport {
    pub label: String,
    pub outcome: Result<Delivery>,
}

impl TaskReport {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn grid(&self) -> Option<&PixelGrid> {
        match &self.outcome {
            Ok(Delivery::Grid(g)) => Some(g),
            _ => None,
        }
    }
}

/// Reports for a whole batch, in submission order.
#[derive(Debug)]
pub struct BatchReport {
    pub tasks: Vec<TaskReport>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(TaskReport::is_ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|t| !t.is_ok())
    }

    pub fn first_failure(&self) -> Option<&IngestError> {
        self.tasks.iter().find_map(|t| t.outcome.as_ref().err())
    }

    /// Returned grids by label, or the first failure if any task failed.
    /// Grids already handed to sinks are not included.
    pub fn into_grids(self) -> Result<Vec<(String, PixelGrid)>> {
        let mut grids = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            match task.outcome? {
                Delivery::Grid(g) => grids.push((task.label, g)),
                Delivery::Sink | Delivery::Withheld => {}
            }
        }
        Ok(grids)
    }
}

/// Outcome of a task before the batch policy has been applied.
enum Finished {
    Published,
    Returned(PixelGrid),
    Pending(PixelGrid, Sink),
}

type Slot = (usize, Result<Finished>);

/// Tasks launched by [`dispatch`]. Results are only observable through [`Batch::join`].
pub struct Batch {
    labels: Vec<String>,
    policy: FailurePolicy,
    rx: mpsc::Receiver<Slot>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Blocks until every task has reported, then applies the failure policy.
    #[instrument(skip_all, fields(tasks = self.labels.len()))]
    pub fn join(self) -> BatchReport {
        let mut slots: Vec<Option<Result<Finished>>> = (0..self.labels.len()).map(|_| None).collect();
        // ends once every worker has dropped its sender
        for (index, result) in self.rx.iter() {
            slots[index] = Some(result);
        }
        let results = self
            .labels
            .into_iter()
            .zip(slots)
            .map(|(label, slot)| {
                let result = slot.unwrap_or_else(|| {
                    warn!(image = %label, "decode task exited without a result");
                    Err(IngestError::TaskPanicked {
                        label: label.clone(),
                    })
                });
                (label, result)
            })
            .collect();
        settle(results, self.policy)
    }
}

/// Launches one thread per task and returns without waiting for any of them.
///
/// There is no worker pool: every task starts immediately. Call [`Batch::join`]
/// before reading results; sink delivery order is unspecified.
#[instrument(skip_all, fields(tasks = tasks.len()))]
pub fn dispatch(tasks: Vec<DecodeTask>, cfg: IngestConfig) -> Result<Batch> {
    cfg.validate()?;
    if tasks.is_empty() {
        return Err(IngestError::Empty);
    }

    let cfg = Arc::new(cfg);
    let (tx, rx) = mpsc::channel::<Slot>();
    let mut labels = Vec::with_capacity(tasks.len());

    for (index, task) in tasks.into_iter().enumerate() {
        let label = task.label.clone();
        let worker_tx = tx.clone();
        let worker_cfg = Arc::clone(&cfg);
        let spawned = thread::Builder::new()
            .name(format!("{}{}", cfg.thread_name_prefix, index))
            .spawn(move || {
                let (_, result) = finish(task, &worker_cfg);
                // the batch may have been dropped without joining
                let _ = worker_tx.send((index, result));
            });
        if let Err(source) = spawned {
            warn!(image = %label, error = %source, "failed to spawn decode thread");
            let _ = tx.send((
                index,
                Err(IngestError::Spawn {
                    label: label.clone(),
                    source,
                }),
            ));
        }
        labels.push(label);
    }
    debug!(count = labels.len(), "decode tasks dispatched");

    Ok(Batch {
        labels,
        policy: cfg.failure_policy,
        rx,
    })
}

/// Decodes every task and waits for all of them.
///
/// Runs on the rayon pool when the `parallel` feature is enabled and
/// `cfg.parallel` is set; otherwise tasks run one after another on the caller's thread.
#[instrument(skip_all, fields(tasks = tasks.len()))]
pub fn decode_all(tasks: Vec<DecodeTask>, cfg: IngestConfig) -> Result<BatchReport> {
    cfg.validate()?;
    if tasks.is_empty() {
        return Err(IngestError::Empty);
    }

    #[cfg(feature = "parallel")]
    {
        if cfg.parallel {
            let results: Vec<(String, Result<Finished>)> =
                tasks.into_par_iter().map(|t| finish(t, &cfg)).collect();
            return Ok(settle(results, cfg.failure_policy));
        }
    }

    let results = tasks.into_iter().map(|t| finish(t, &cfg)).collect();
    Ok(settle(results, cfg.failure_policy))
}

/// Runs a single task on the calling thread.
pub fn run_task(task: DecodeTask, cfg: &IngestConfig) -> TaskReport {
    if let Err(e) = cfg.validate() {
        return TaskReport {
            label: task.label,
            outcome: Err(e),
        };
    }
    let (label, result) = finish(task, cfg);
    let mut tasks = settle(vec![(label, result)], cfg.failure_policy).tasks;
    tasks.remove(0)
}

/// Decodes one task and publishes it unless the policy defers delivery.
fn finish(task: DecodeTask, cfg: &IngestConfig) -> (String, Result<Finished>) {
    let DecodeTask {
        label,
        bytes,
        codec,
        sink,
    } = task;
    let result = decode_grid(&label, &bytes, codec.as_ref(), cfg).and_then(|grid| {
        match (sink, cfg.failure_policy) {
            (Some(sink), FailurePolicy::Isolate) => {
                publish(&label, sink, grid).map(|()| Finished::Published)
            }
            (Some(sink), FailurePolicy::AllOrNothing) => Ok(Finished::Pending(grid, sink)),
            (None, _) => Ok(Finished::Returned(grid)),
        }
    });
    (label, result)
}

fn settle(results: Vec<(String, Result<Finished>)>, policy: FailurePolicy) -> BatchReport {
    let deliver = match policy {
        FailurePolicy::Isolate => true,
        FailurePolicy::AllOrNothing => results.iter().all(|(_, r)| r.is_ok()),
    };
    if !deliver {
        warn!(
            failed = results.iter().filter(|(_, r)| r.is_err()).count(),
            "batch failed; withholding all decoded grids"
        );
    }
    let tasks = results
        .into_iter()
        .map(|(label, result)| {
            let outcome = result.and_then(|finished| match finished {
                Finished::Published => Ok(Delivery::Sink),
                Finished::Returned(grid) if deliver => Ok(Delivery::Grid(grid)),
                Finished::Pending(grid, sink) if deliver => {
                    publish(&label, sink, grid).map(|()| Delivery::Sink)
                }
                Finished::Returned(_) | Finished::Pending(..) => Ok(Delivery::Withheld),
            });
            TaskReport { label, outcome }
        })
        .collect();
    BatchReport { tasks }
}

/// Hands the grid to the sink. A panicking sink fails only its own task.
fn publish(label: &str, sink: Sink, grid: PixelGrid) -> Result<()> {
    let (w, h) = grid.dimensions();
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || sink(grid))) {
        warn!(image = %label, reason = %panic_message(payload.as_ref()), "sink panicked");
        return Err(IngestError::TaskPanicked {
            label: label.to_string(),
        });
    }
    info!(image = %label, width = w, height = h, stage = %TaskStage::Published, "grid published");
    Ok(())
}

/// Runs one codec step, turning a panic into a `CodecError` for that step.
fn guarded<T>(step: impl FnOnce() -> std::result::Result<T, CodecError>) -> std::result::Result<T, CodecError> {
    panic::catch_unwind(AssertUnwindSafe(step))
        .unwrap_or_else(|payload| Err(CodecError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

/// Metadata pass, pixel pass, then normalization. Each pass reads its own cursor.
fn decode_grid(label: &str, bytes: &[u8], codec: &dyn Codec, cfg: &IngestConfig) -> Result<PixelGrid> {
    let span = info_span!("decode", image = %label, codec = codec.name());
    let _enter = span.enter();
    trace!(stage = %TaskStage::Created, bytes = bytes.len());

    let fail = |stage: TaskStage, source: CodecError| {
        debug!(%stage, error = %source, "decode step failed; task {}", TaskStage::Failed);
        IngestError::codec(label, stage, source)
    };

    debug!(stage = %TaskStage::MetadataDecoding, "decoding metadata");
    let dims = guarded(|| codec.decode_metadata(Cursor::new(bytes)))
        .map_err(|e| fail(TaskStage::MetadataDecoding, e))?;
    check_dimensions(dims, cfg.max_side).map_err(|e| fail(TaskStage::MetadataDecoding, e))?;

    debug!(stage = %TaskStage::PixelDecoding, width = dims.width, height = dims.height, "decoding pixels");
    let source = guarded(|| codec.decode_image(Cursor::new(bytes)))
        .map_err(|e| fail(TaskStage::PixelDecoding, e))?;
    let decoded = source.dimensions();
    if decoded != dims {
        warn!(
            meta_width = dims.width,
            meta_height = dims.height,
            width = decoded.width,
            height = decoded.height,
            "decoded size differs from metadata"
        );
    }

    debug!(stage = %TaskStage::Normalizing, shape = ?cfg.grid_shape, truncation = ?cfg.truncation);
    guarded(|| Ok(normalize(source.as_ref(), dims, cfg.grid_shape, cfg.truncation)))
        .map_err(|e| fail(TaskStage::Normalizing, e))
}

fn check_dimensions(dims: Dimensions, max_side: u32) -> std::result::Result<(), CodecError> {
    let Dimensions { width, height } = dims;
    if width == 0 || height == 0 {
        return Err(CodecError::EmptyImage { width, height });
    }
    if width > max_side || height > max_side {
        return Err(CodecError::TooLarge {
            width,
            height,
            max: max_side,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_limits() {
        assert!(check_dimensions(Dimensions::new(4, 4), 4).is_ok());
        assert!(matches!(
            check_dimensions(Dimensions::new(0, 4), 4),
            Err(CodecError::EmptyImage { width: 0, height: 4 })
        ));
        assert!(matches!(
            check_dimensions(Dimensions::new(5, 1), 4),
            Err(CodecError::TooLarge { max: 4, .. })
        ));
    }

    #[test]
    fn panics_become_step_errors() {
        let err = guarded::<()>(|| panic!("bad header")).expect_err("panicked");
        assert!(matches!(&err, CodecError::Panicked(msg) if msg == "bad header"));
        let err = guarded::<()>(|| panic!("{} rows", 3)).expect_err("panicked");
        assert!(matches!(&err, CodecError::Panicked(msg) if msg == "3 rows"));
        assert_eq!(guarded(|| Ok(7)).ok(), Some(7));
    }

    #[test]
    fn into_grids_skips_sink_deliveries() {
        let report = BatchReport {
            tasks: vec![
                TaskReport {
                    label: "a".into(),
                    outcome: Ok(Delivery::Grid(PixelGrid::new(1, 1))),
                },
                TaskReport {
                    label: "b".into(),
                    outcome: Ok(Delivery::Sink),
                },
            ],
        };
        assert!(report.is_success());
        let grids = report.into_grids().expect("no failures");
        assert_eq!(grids.len(), 1);
        assert_eq!(grids[0].0, "a");
    }

    #[test]
    fn into_grids_surfaces_first_failure() {
        let report = BatchReport {
            tasks: vec![
                TaskReport {
                    label: "ok".into(),
                    outcome: Ok(Delivery::Grid(PixelGrid::new(1, 1))),
                },
                TaskReport {
                    label: "bad".into(),
                    outcome: Err(IngestError::TaskPanicked { label: "bad".into() }),
                },
            ],
        };
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.first_failure().and_then(|e| e.label()), Some("bad"));
        assert!(report.into_grids().is_err());
    }
}
