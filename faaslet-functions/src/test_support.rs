//! In-process container runtime for tests
//!
//! Units echo whatever was written to their stdin. Any step can be made to
//! fail, the exit wait can be made to hang, and steps can be slowed down.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;

use crate::runtime::{ContainerRuntime, RuntimeError, UnitInput, UnitSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Create,
    Start,
    Attach,
    Write,
    CloseInput,
    Wait,
    Stop,
    Remove,
    Logs,
}

#[derive(Default)]
struct Recorded {
    calls: Vec<(Step, String)>,
    images: Vec<String>,
}

#[derive(Default)]
pub struct ScriptedRuntime {
    recorded: Arc<Mutex<Recorded>>,
    stdin: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    next_id: AtomicUsize,
    fail_at: Option<Step>,
    panic_at: Option<Step>,
    hang: bool,
    delay: Option<Duration>,
    images: Vec<String>,
    loaded: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(mut self, step: Step) -> Self {
        self.fail_at = Some(step);
        self
    }

    pub fn panicking_at(mut self, step: Step) -> Self {
        self.panic_at = Some(step);
        self
    }

    /// Units never exit on their own
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Units take `delay` to exit
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_images(mut self, images: &[&str]) -> Self {
        self.images = images.iter().map(|i| (*i).to_string()).collect();
        self
    }

    pub fn steps(&self) -> Vec<Step> {
        self.recorded.lock().calls.iter().map(|(s, _)| *s).collect()
    }

    pub fn count(&self, step: Step) -> usize {
        self.recorded
            .lock()
            .calls
            .iter()
            .filter(|(s, _)| *s == step)
            .count()
    }

    pub fn created_images(&self) -> Vec<String> {
        self.recorded.lock().images.clone()
    }

    pub fn removed_units(&self) -> Vec<String> {
        self.recorded
            .lock()
            .calls
            .iter()
            .filter(|(s, _)| *s == Step::Remove)
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub fn loaded_archives(&self) -> Vec<Vec<u8>> {
        self.loaded.lock().clone()
    }

    fn record(&self, step: Step, unit_id: &str) -> Result<(), RuntimeError> {
        record(&self.recorded, step, unit_id);
        if self.panic_at == Some(step) {
            panic!("scripted panic at {:?}", step);
        }
        if self.fail_at == Some(step) {
            return Err(RuntimeError::Other(format!("scripted failure at {:?}", step)));
        }
        Ok(())
    }
}

fn record(recorded: &Mutex<Recorded>, step: Step, unit_id: &str) {
    recorded.lock().calls.push((step, unit_id.to_string()));
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn create(&self, spec: &UnitSpec) -> Result<String, RuntimeError> {
        let unit_id = format!("unit-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.record(Step::Create, &unit_id)?;
        self.recorded.lock().images.push(spec.image.clone());
        Ok(unit_id)
    }

    async fn start(&self, unit_id: &str) -> Result<(), RuntimeError> {
        self.record(Step::Start, unit_id)
    }

    async fn attach(&self, unit_id: &str) -> Result<UnitInput, RuntimeError> {
        self.record(Step::Attach, unit_id)?;
        Ok(Box::pin(CaptureWriter {
            unit_id: unit_id.to_string(),
            recorded: self.recorded.clone(),
            stdin: self.stdin.clone(),
            fail: self.fail_at == Some(Step::Write),
        }))
    }

    async fn wait(&self, unit_id: &str) -> Result<i64, RuntimeError> {
        self.record(Step::Wait, unit_id)?;
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(0)
    }

    async fn stop(&self, unit_id: &str, _grace: Duration) -> Result<(), RuntimeError> {
        self.record(Step::Stop, unit_id)
    }

    async fn remove(&self, unit_id: &str) -> Result<(), RuntimeError> {
        self.record(Step::Remove, unit_id)
    }

    async fn logs(&self, unit_id: &str) -> Result<Vec<u8>, RuntimeError> {
        self.record(Step::Logs, unit_id)?;
        Ok(self.stdin.lock().get(unit_id).cloned().unwrap_or_default())
    }

    async fn list_images(&self) -> Result<Vec<String>, RuntimeError> {
        Ok(self.images.clone())
    }

    async fn load_image(&self, archive: &Path) -> Result<(), RuntimeError> {
        let data = tokio::fs::read(archive).await?;
        self.loaded.lock().push(data);
        Ok(())
    }
}

struct CaptureWriter {
    unit_id: String,
    recorded: Arc<Mutex<Recorded>>,
    stdin: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail: bool,
}

impl AsyncWrite for CaptureWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        record(&self.recorded, Step::Write, &self.unit_id);
        if self.fail {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "scripted write failure",
            )));
        }
        self.stdin
            .lock()
            .entry(self.unit_id.clone())
            .or_default()
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        record(&self.recorded, Step::CloseInput, &self.unit_id);
        Poll::Ready(Ok(()))
    }
}
