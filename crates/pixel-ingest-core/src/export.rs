use crate::grid::PixelGrid;
use crate::scheduler::{BatchReport, Delivery};
use serde_json::{Value, json};

/// Serialize a grid as nested rows: `[[[r,g,b,a], ...], ...]`, indexed `[row][col]`.
pub fn grid_to_json(grid: &PixelGrid) -> Value {
    let rows: Vec<Value> = grid
        .rows()
        .map(|row| Value::Array(row.iter().map(|px| json!(px.0)).collect()))
        .collect();
    json!({
        "width": grid.width(),
        "height": grid.height(),
        "rows": rows,
    })
}

/// Summarize a batch: one entry per task with its status and grid size or error.
/// Shape: `{ tasks: [ { label, status, width?, height?, stage?, error? } ], succeeded, failed, meta }`.
pub fn report_to_json(report: &BatchReport) -> Value {
    let tasks: Vec<Value> = report
        .tasks
        .iter()
        .map(|t| match &t.outcome {
            Ok(Delivery::Grid(g)) => json!({
                "label": t.label,
                "status": "decoded",
                "width": g.width(),
                "height": g.height(),
            }),
            Ok(Delivery::Sink) => json!({"label": t.label, "status": "published"}),
            Ok(Delivery::Withheld) => json!({"label": t.label, "status": "withheld"}),
            Err(e) => json!({
                "label": t.label,
                "status": "failed",
                "stage": e.stage(),
                "error": e.to_string(),
            }),
        })
        .collect();
    let failed = report.failures().count();
    json!({
        "tasks": tasks,
        "succeeded": report.len() - failed,
        "failed": failed,
        "meta": {
            "app": "pixel-ingest",
            "version": env!("CARGO_PKG_VERSION"),
            "format": "RGBA8888",
        },
    })
}
