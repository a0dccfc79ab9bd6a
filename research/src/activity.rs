use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityPhase {
    FetchStarted,
    FetchCompleted,
    FetchFailed,
    SynthesisStarted,
    ValidationCompleted,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActivityEvent {
    pub phase: ActivityPhase,
    pub source_id: Option<String>,
    pub message: String,
}

impl ActivityEvent {
    pub fn new(phase: ActivityPhase, source_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            phase,
            source_id: source_id.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Progress sink for a research run.
///
/// `emit` is called inline from the orchestrator and must return promptly.
/// Implementations handle their own failures; nothing they do can change
/// the outcome of a run.
pub trait ActivityReporter: Send + Sync {
    fn emit(&self, event: ActivityEvent);
}

/// Drops every event.
pub struct NoopReporter;

impl ActivityReporter for NoopReporter {
    fn emit(&self, _: ActivityEvent) {}
}

/// Logs events through `tracing`.
pub struct TracingReporter;

impl ActivityReporter for TracingReporter {
    fn emit(&self, event: ActivityEvent) {
        let source = event.source_id.as_deref().unwrap_or("-");
        match event.phase {
            ActivityPhase::FetchFailed => {
                tracing::warn!(phase = ?event.phase, source, "{}", event.message)
            }
            _ => tracing::info!(phase = ?event.phase, source, "{}", event.message),
        }
    }
}

/// Forwards events to an unbounded channel so a UI task can render them
/// as they arrive. A dropped receiver is ignored.
pub struct ChannelReporter(mpsc::UnboundedSender<ActivityEvent>);

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ActivityEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl ActivityReporter for ChannelReporter {
    fn emit(&self, event: ActivityEvent) {
        let _ = self.0.send(event);
    }
}

/// Writes a markdown progress log, one numbered line per event.
pub struct MarkdownReporter<W: Write + Send> {
    inner: Mutex<MarkdownLog<W>>,
}

struct MarkdownLog<W> {
    writer: W,
    step: u32,
}

impl<W: Write + Send> MarkdownReporter<W> {
    pub fn new(name: &str, mut writer: W) -> std::io::Result<Self> {
        write!(writer, "## {}\n\n", name)?;
        writer.flush()?;

        Ok(Self {
            inner: Mutex::new(MarkdownLog { writer, step: 0 }),
        })
    }

    pub fn into_inner(self) -> W {
        match self.inner.into_inner() {
            Ok(log) => log.writer,
            Err(poisoned) => poisoned.into_inner().writer,
        }
    }
}

impl<W> MarkdownLog<W>
where
    W: Write,
{
    fn write_event(&mut self, event: &ActivityEvent) -> std::io::Result<()> {
        self.step += 1;
        match &event.source_id {
            Some(source) => writeln!(
                self.writer,
                "{}. **{:?}** `{}`: {}",
                self.step, event.phase, source, event.message
            )?,
            None => writeln!(
                self.writer,
                "{}. **{:?}**: {}",
                self.step, event.phase, event.message
            )?,
        }
        self.writer.flush()
    }
}

impl<W: Write + Send> ActivityReporter for MarkdownReporter<W> {
    fn emit(&self, event: ActivityEvent) {
        let Ok(mut log) = self.inner.lock() else {
            return;
        };
        if let Err(err) = log.write_event(&event) {
            tracing::warn!(error = %err, "failed to write activity log");
        }
    }
}

/// Broadcasts each event to several reporters.
#[derive(Default)]
pub struct FanoutReporter(Vec<Arc<dyn ActivityReporter>>);

impl FanoutReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn ActivityReporter>) -> Self {
        self.0.push(reporter);
        self
    }
}

impl ActivityReporter for FanoutReporter {
    fn emit(&self, event: ActivityEvent) {
        for reporter in &self.0 {
            reporter.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_reporter() -> std::io::Result<()> {
        let reporter = MarkdownReporter::new("acme.sg", Vec::new())?;
        reporter.emit(ActivityEvent::new(
            ActivityPhase::FetchStarted,
            Some("https://acme.sg/"),
            "fetching website",
        ));
        reporter.emit(ActivityEvent::new(
            ActivityPhase::SynthesisStarted,
            None,
            "synthesizing from 1 source",
        ));

        let log = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(
            log,
            "## acme.sg\n\n\
             1. **FetchStarted** `https://acme.sg/`: fetching website\n\
             2. **SynthesisStarted**: synthesizing from 1 source\n"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_channel_reporter_survives_closed_receiver() {
        let (reporter, mut rx) = ChannelReporter::new();
        reporter.emit(ActivityEvent::new(ActivityPhase::FetchStarted, None, "a"));
        assert_eq!(rx.recv().await.map(|e| e.message), Some("a".to_string()));

        drop(rx);
        reporter.emit(ActivityEvent::new(ActivityPhase::FetchStarted, None, "b"));
    }

    #[test]
    fn test_fanout() {
        let (a, mut rx_a) = ChannelReporter::new();
        let (b, mut rx_b) = ChannelReporter::new();
        let fanout = FanoutReporter::new().with(Arc::new(a)).with(Arc::new(b));

        fanout.emit(ActivityEvent::new(ActivityPhase::ValidationCompleted, None, "done"));

        assert_eq!(rx_a.try_recv().map(|e| e.phase), Ok(ActivityPhase::ValidationCompleted));
        assert_eq!(rx_b.try_recv().map(|e| e.phase), Ok(ActivityPhase::ValidationCompleted));
    }
}
