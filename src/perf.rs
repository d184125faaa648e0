use serde_json::{Value, json};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// JSONL timing log. One line per span or counter set; a ranked summary
/// lands next to it as `<stem>_hot.log` when the last handle is dropped.
#[derive(Clone)]
pub struct PerfLogger {
    inner: Arc<Mutex<PerfState>>,
}

struct PerfState {
    writer: BufWriter<File>,
    path: PathBuf,
    span_totals: HashMap<String, (f64, u64)>,
    count_totals: HashMap<String, u64>,
}

impl std::fmt::Debug for PerfLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = self
            .inner
            .lock()
            .map(|state| state.path.clone())
            .unwrap_or_default();
        f.debug_struct("PerfLogger").field("path", &path).finish()
    }
}

impl PerfLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(PerfState {
                writer: BufWriter::new(file),
                path,
                span_totals: HashMap::new(),
                count_totals: HashMap::new(),
            })),
        })
    }

    pub fn log_span_ms(&self, name: &str, page: Option<usize>, ms: f64) {
        let line = json!({
            "type": "perf.span",
            "name": name,
            "page": page,
            "unit": "ms",
            "ms": round3(ms),
        });
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.span_totals.entry(name.to_string()).or_insert((0.0, 0));
            entry.0 += ms;
            entry.1 = entry.1.saturating_add(1);
            write_line(&mut state.writer, &line);
        }
    }

    pub fn log_counts(&self, name: &str, page: Option<usize>, counts: &[(&str, u64)]) {
        let map: serde_json::Map<String, Value> = counts
            .iter()
            .map(|(key, value)| (key.to_string(), Value::from(*value)))
            .collect();
        let line = json!({
            "type": "perf.counts",
            "name": name,
            "page": page,
            "counts": map,
        });
        if let Ok(mut state) = self.inner.lock() {
            for (key, value) in counts {
                let entry = state.count_totals.entry(format!("{name}.{key}")).or_insert(0);
                *entry = entry.saturating_add(*value);
            }
            write_line(&mut state.writer, &line);
        }
    }

    /// Runs `f` and records its wall time under `name`.
    pub fn time<T>(&self, name: &str, page: Option<usize>, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        self.log_span_ms(name, page, elapsed_ms(started));
        out
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

/// Times `f` when a logger is present, otherwise just runs it.
pub fn timed<T>(
    perf: Option<&PerfLogger>,
    name: &str,
    page: Option<usize>,
    f: impl FnOnce() -> T,
) -> T {
    match perf {
        Some(logger) => logger.time(name, page, f),
        None => f(),
    }
}

pub fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn round3(ms: f64) -> f64 {
    (ms * 1000.0).round() / 1000.0
}

fn write_line(writer: &mut BufWriter<File>, line: &Value) {
    let _ = writeln!(writer, "{line}");
}

impl Drop for PerfState {
    fn drop(&mut self) {
        let _ = self.writer.flush();
        let Ok(file) = File::create(hot_path_for(&self.path)) else {
            return;
        };
        let mut writer = BufWriter::new(file);

        let mut spans: Vec<_> = self.span_totals.iter().collect();
        spans.sort_by(|a, b| b.1.0.total_cmp(&a.1.0));
        for (rank, (name, (ms, count))) in spans.into_iter().take(100).enumerate() {
            let avg = if *count == 0 { 0.0 } else { ms / *count as f64 };
            let line = json!({
                "type": "perf.hot.span",
                "rank": rank + 1,
                "name": name,
                "unit": "ms",
                "ms": round3(*ms),
                "count": count,
                "avg_ms": round3(avg),
            });
            write_line(&mut writer, &line);
        }

        let mut counts: Vec<_> = self.count_totals.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1));
        for (rank, (name, value)) in counts.into_iter().take(100).enumerate() {
            let line = json!({
                "type": "perf.hot.count",
                "rank": rank + 1,
                "name": name,
                "value": value,
            });
            write_line(&mut writer, &line);
        }
        let _ = writer.flush();
    }
}

fn hot_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|name| name.to_str())
        .unwrap_or("fitframe_perf");
    path.with_file_name(format!("{stem}_hot.log"))
}
