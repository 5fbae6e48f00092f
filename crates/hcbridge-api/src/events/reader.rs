//! Self-restarting event stream reader.
//!
//! Wraps a [`FrameSource`] in an endless [`Stream`] of
//! [`SessionEnvelope`]s. Each successful connection yields `Start`, the
//! validated events, then one `Stop`. Then the next connection begins.
//!
//! A normal end of stream reconnects immediately. An error reconnects
//! after exponential backoff with jitter, so a cloud that rejects every
//! request is not hammered. Dropping the stream closes the connection.
//!
//! ```rust,ignore
//! let source = SseSource::new(client);
//! let stream = EventStream::new(source).start();
//! futures_util::pin_mut!(stream);
//! while let Some(envelope) = stream.next().await {
//!     println!("{envelope:?}");
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_core::Stream;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::watch;
use tokio::time::Instant;

use super::{DomainEvent, RawFrame, SessionEnvelope};
use crate::error::{Error, RequestContext};

// ── FrameSource ──────────────────────────────────────────────────────

/// One open connection: where it points and the frames it delivers.
pub struct FrameSession {
    pub context: RequestContext,
    pub frames: BoxStream<'static, Result<RawFrame, Error>>,
}

/// Something that can open an event connection.
///
/// `target` scopes the connection to one appliance; `None` means all.
pub trait FrameSource: Send + Sync + 'static {
    fn open(
        &self,
        target: Option<&str>,
    ) -> impl Future<Output = Result<FrameSession, Error>> + Send;
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnecting after errors.
///
/// A zero `initial_delay` disables throttling entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first retry after an error. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 60s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

// ── StreamState ──────────────────────────────────────────────────────

/// Where the reader currently is in its connection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Streaming,
    /// The last session ended normally.
    Closed,
    /// `attempt` consecutive failures so far.
    Failed { attempt: u32 },
}

// ── EventStream ──────────────────────────────────────────────────────

/// Builder for the reconnecting envelope stream.
pub struct EventStream<S> {
    source: Arc<S>,
    target: Option<String>,
    reconnect: ReconnectConfig,
    state_tx: watch::Sender<StreamState>,
}

impl<S: FrameSource> EventStream<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            target: None,
            reconnect: ReconnectConfig::default(),
            state_tx: watch::Sender::new(StreamState::Idle),
        }
    }

    /// Only read events of one appliance.
    pub fn for_appliance(mut self, ha_id: impl Into<String>) -> Self {
        self.target = Some(ha_id.into());
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Observe the connection cycle. Take this before [`start`](Self::start).
    pub fn state(&self) -> watch::Receiver<StreamState> {
        self.state_tx.subscribe()
    }

    /// Begin reading. Nothing happens until the stream is polled.
    pub fn start(self) -> impl Stream<Item = SessionEnvelope> + Send + 'static {
        let Self {
            source,
            target,
            reconnect,
            state_tx,
        } = self;

        async_stream::stream! {
            let mut attempt: u32 = 0;
            let mut outcomes = OutcomeLog::default();

            loop {
                state_tx.send_replace(StreamState::Connecting);
                let started = Instant::now();

                let session = match source.open(target.as_deref()).await {
                    Ok(session) => session,
                    Err(e) => {
                        outcomes.failed(&e, started.elapsed(), attempt);
                        let delay = backoff_for(&e, attempt, &reconnect);
                        attempt = attempt.saturating_add(1);
                        state_tx.send_replace(StreamState::Failed { attempt });
                        pause(delay).await;
                        continue;
                    }
                };

                let FrameSession { context, mut frames } = session;
                tracing::debug!(url = %context.url, status = ?context.status, "Event stream open");
                yield SessionEnvelope::Start;
                state_tx.send_replace(StreamState::Streaming);

                let mut delivered = false;
                let result: Result<(), Error> = loop {
                    match frames.next().await {
                        None => break Ok(()),
                        Some(Err(e)) => break Err(e),
                        Some(Ok(frame)) => match DomainEvent::from_frame(&frame, &context) {
                            Ok((event, warnings)) => {
                                for issue in &warnings {
                                    tracing::warn!(
                                        path = %issue.path,
                                        event_type = %event.event,
                                        ha_id = event.ha_id().unwrap_or_default(),
                                        "Undocumented field in event: {}",
                                        issue.message
                                    );
                                }
                                delivered = true;
                                yield SessionEnvelope::Event(event);
                            }
                            Err(e) => break Err(e),
                        },
                    }
                };
                drop(frames);

                let elapsed = started.elapsed();
                match result {
                    Ok(()) => {
                        outcomes.closed(elapsed);
                        attempt = 0;
                        yield SessionEnvelope::Stop { error: None };
                        state_tx.send_replace(StreamState::Closed);
                    }
                    Err(e) => {
                        if delivered {
                            attempt = 0;
                        }
                        outcomes.failed(&e, elapsed, attempt);
                        let delay = backoff_for(&e, attempt, &reconnect);
                        attempt = attempt.saturating_add(1);
                        yield SessionEnvelope::Stop { error: Some(Arc::new(e)) };
                        state_tx.send_replace(StreamState::Failed { attempt });
                        pause(delay).await;
                    }
                }
            }
        }
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tracing::debug!(delay = ?delay, "Waiting before reconnect");
        tokio::time::sleep(delay).await;
    }
}

// ── Outcome logging ──────────────────────────────────────────────────

/// Logs how each session ended. A run of identical errors is logged once
/// at warn level; the repeats go to debug and are counted.
#[derive(Debug, Default)]
struct OutcomeLog {
    last_error: Option<String>,
    repeats: u32,
}

impl OutcomeLog {
    fn closed(&mut self, elapsed: Duration) {
        self.flush();
        tracing::info!(elapsed = ?elapsed, "Event stream ended, reconnecting");
    }

    fn failed(&mut self, error: &Error, elapsed: Duration, attempt: u32) {
        let text = error.to_string();
        if self.last_error.as_deref() == Some(text.as_str()) {
            self.repeats += 1;
            tracing::debug!(elapsed = ?elapsed, attempt, repeats = self.repeats, "Event stream failed again");
            return;
        }

        self.flush();
        if let Some(input) = offending_input(error) {
            tracing::warn!(input = %input, "Rejected event");
        }
        tracing::warn!(error = %text, elapsed = ?elapsed, attempt, "Event stream failed");
        self.last_error = Some(text);
    }

    fn flush(&mut self) {
        if self.repeats > 0 {
            tracing::info!(
                repeats = self.repeats,
                error = self.last_error.as_deref().unwrap_or_default(),
                "Previous event stream error repeated"
            );
        }
        self.repeats = 0;
        self.last_error = None;
    }
}

/// The raw frame or decoded event that ended a session, for the log.
fn offending_input(error: &Error) -> Option<String> {
    match error {
        Error::StreamParse { frame, .. } => Some(frame.to_string()),
        Error::Validation { event, .. } => Some(event.to_string()),
        _ => None,
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
pub(crate) fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

/// A rate limit overrides a shorter backoff.
fn backoff_for(error: &Error, attempt: u32, config: &ReconnectConfig) -> Duration {
    let delay = calculate_backoff(attempt, config);
    match error {
        Error::RateLimited { retry_after_secs } if !config.initial_delay.is_zero() => {
            delay.max(Duration::from_secs(*retry_after_secs))
        }
        _ => delay,
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::events::EventKind;

    /// One scripted connection attempt.
    enum Script {
        Refuse(Error),
        Serve(Vec<Result<RawFrame, Error>>),
    }

    #[derive(Default)]
    struct ScriptedSource {
        scripts: Mutex<VecDeque<Script>>,
        opened: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                opened: Mutex::default(),
            }
        }
    }

    impl FrameSource for Arc<ScriptedSource> {
        async fn open(&self, target: Option<&str>) -> Result<FrameSession, Error> {
            self.opened.lock().unwrap().push(target.map(str::to_owned));
            let next = self.scripts.lock().unwrap().pop_front();
            match next {
                Some(Script::Refuse(e)) => Err(e),
                Some(Script::Serve(frames)) => Ok(FrameSession {
                    context: RequestContext::new("https://test/events"),
                    frames: futures_util::stream::iter(frames).boxed(),
                }),
                None => std::future::pending().await,
            }
        }
    }

    fn status(id: &str, key: &str) -> Result<RawFrame, Error> {
        Ok(RawFrame {
            id: Some(id.into()),
            event: Some("STATUS".into()),
            data: Some(format!(r#"{{"items":[{{"key":"{key}","value":1}}]}}"#)),
        })
    }

    fn drop_error() -> Error {
        Error::Stream {
            reason: "connection reset".into(),
            context: RequestContext::new("https://test/events"),
        }
    }

    async fn collect(source: Arc<ScriptedSource>, n: usize) -> Vec<SessionEnvelope> {
        let stream = EventStream::new(source)
            .with_reconnect(ReconnectConfig {
                initial_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
            })
            .start();
        stream.take(n).collect().await
    }

    fn shape(envelopes: &[SessionEnvelope]) -> Vec<&'static str> {
        envelopes
            .iter()
            .map(|e| match e {
                SessionEnvelope::Start => "start",
                SessionEnvelope::Event(_) => "event",
                SessionEnvelope::Stop { error: None } => "stop",
                SessionEnvelope::Stop { error: Some(_) } => "stop!",
            })
            .collect()
    }

    #[tokio::test]
    async fn normal_end_reconnects_with_fresh_session() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::Serve(vec![
                status("A1", "BSH.Common.Status.DoorState"),
                status("A1", "BSH.Common.Status.OperationState"),
            ]),
            Script::Serve(vec![status("A1", "BSH.Common.Status.DoorState")]),
        ]));

        let envelopes = collect(source.clone(), 7).await;
        assert_eq!(
            shape(&envelopes),
            vec!["start", "event", "event", "stop", "start", "event", "stop"]
        );
        assert_eq!(source.opened.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn malformed_frame_ends_session_with_parse_error() {
        let bad = Ok(RawFrame {
            id: Some("A1".into()),
            event: Some("STATUS".into()),
            data: Some("{oops".into()),
        });
        let source = Arc::new(ScriptedSource::new(vec![
            Script::Serve(vec![status("A1", "k"), bad, status("A1", "never")]),
            Script::Serve(vec![]),
        ]));

        let envelopes = collect(source, 4).await;
        assert_eq!(shape(&envelopes), vec!["start", "event", "stop!", "start"]);
        let SessionEnvelope::Stop { error: Some(err) } = &envelopes[2] else {
            panic!("expected failing stop");
        };
        assert!(matches!(**err, Error::StreamParse { .. }));
    }

    #[tokio::test]
    async fn schema_failure_ends_session_with_validation_error() {
        let bad = Ok(RawFrame {
            id: Some("A1".into()),
            event: Some("STATUS".into()),
            data: Some(r#"{"items":[{"value":1}]}"#.into()),
        });
        let source = Arc::new(ScriptedSource::new(vec![Script::Serve(vec![bad])]));

        let envelopes = collect(source, 2).await;
        let SessionEnvelope::Stop { error: Some(err) } = &envelopes[1] else {
            panic!("expected failing stop");
        };
        match &**err {
            Error::Validation { issues, .. } => assert_eq!(issues[0].path, "$.data.items[0].key"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_emits_no_envelopes_and_retries() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::Refuse(drop_error()),
            Script::Refuse(drop_error()),
            Script::Serve(vec![status("A1", "k")]),
        ]));

        let envelopes = collect(source.clone(), 3).await;
        assert_eq!(shape(&envelopes), vec!["start", "event", "stop"]);
        assert_eq!(source.opened.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn transport_error_mid_session_is_reported_on_stop() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::Serve(vec![status("A1", "k"), Err(drop_error())]),
            Script::Serve(vec![]),
        ]));

        let envelopes = collect(source, 5).await;
        assert_eq!(
            shape(&envelopes),
            vec!["start", "event", "stop!", "start", "stop"]
        );
    }

    #[tokio::test]
    async fn sessions_never_overlap() {
        let mut scripts = Vec::new();
        for i in 0..6 {
            if i % 2 == 0 {
                scripts.push(Script::Serve(vec![status("A1", "k"), Err(drop_error())]));
            } else {
                scripts.push(Script::Serve(vec![status("A1", "k")]));
            }
        }
        let source = Arc::new(ScriptedSource::new(scripts));

        let envelopes = collect(source, 18).await;
        let mut open = false;
        for envelope in &envelopes {
            match envelope {
                SessionEnvelope::Start => {
                    assert!(!open, "start inside an open session");
                    open = true;
                }
                SessionEnvelope::Event(_) => assert!(open, "event outside a session"),
                SessionEnvelope::Stop { .. } => {
                    assert!(open, "stop without start");
                    open = false;
                }
            }
        }
    }

    #[tokio::test]
    async fn appliance_scope_is_passed_to_source() {
        let source = Arc::new(ScriptedSource::new(vec![Script::Serve(vec![])]));
        let stream = EventStream::new(source.clone()).for_appliance("A1").start();
        let _: Vec<_> = stream.take(2).collect().await;
        assert_eq!(*source.opened.lock().unwrap(), vec![Some("A1".to_owned())]);
    }

    #[tokio::test]
    async fn keep_alives_pass_through() {
        let keep_alive = Ok(RawFrame {
            id: None,
            event: Some("KEEP-ALIVE".into()),
            data: None,
        });
        let source = Arc::new(ScriptedSource::new(vec![Script::Serve(vec![keep_alive])]));
        let envelopes = collect(source, 2).await;
        let SessionEnvelope::Event(event) = &envelopes[1] else {
            panic!("expected event");
        };
        assert_eq!(event.event, EventKind::KeepAlive);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_back_off_before_reconnecting() {
        let source = Arc::new(ScriptedSource::new(vec![
            Script::Refuse(drop_error()),
            Script::Serve(vec![]),
        ]));
        let started = Instant::now();
        let stream = EventStream::new(source).start();
        let _: Vec<_> = stream.take(1).collect().await;
        // attempt 0: 1s with jitter factor 1.0
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn state_tracks_connection_cycle() {
        let source = Arc::new(ScriptedSource::new(vec![Script::Serve(vec![status("A1", "k")])]));
        let stream = EventStream::new(source);
        let state = stream.state();
        assert_eq!(*state.borrow(), StreamState::Idle);

        let stream = stream.start();
        futures_util::pin_mut!(stream);
        assert!(stream.next().await.unwrap().is_start());
        assert_eq!(*state.borrow(), StreamState::Connecting);
        stream.next().await.unwrap();
        assert_eq!(*state.borrow(), StreamState::Streaming);
    }

    #[tokio::test]
    async fn exhausted_source_leaves_stream_pending() {
        let source = Arc::new(ScriptedSource::new(vec![]));
        let mut task = tokio_test::task::spawn(EventStream::new(source).start());
        tokio_test::assert_pending!(task.poll_next());
    }

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };

        let d10 = calculate_backoff(10, &config);
        assert!(d10 <= Duration::from_secs(13), "{d10:?} not capped");
    }

    #[test]
    fn zero_initial_delay_disables_backoff() {
        let config = ReconnectConfig {
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(60),
        };
        assert!(calculate_backoff(5, &config).is_zero());
        assert!(backoff_for(&Error::RateLimited { retry_after_secs: 30 }, 0, &config).is_zero());
    }

    #[test]
    fn parse_failures_log_the_raw_frame() {
        let frame = RawFrame {
            id: Some("A1".into()),
            event: Some("STATUS".into()),
            data: Some("{\"items\":[".into()),
        };
        let error = Error::StreamParse {
            message: "EOF while parsing a list".into(),
            frame: frame.clone(),
            context: RequestContext::new("https://api.example.com/api/homeappliances/events"),
        };
        let logged = offending_input(&error).unwrap();
        assert_eq!(logged, frame.to_string());
        assert!(logged.contains("{\\\"items\\\":["), "{logged}");

        let rejected = Error::Validation {
            issues: Vec::new(),
            event: serde_json::json!({"event": "BOGUS"}),
        };
        assert!(offending_input(&rejected).unwrap().contains("BOGUS"));
        assert!(offending_input(&Error::RateLimited { retry_after_secs: 1 }).is_none());
    }

    #[test]
    fn rate_limit_extends_backoff() {
        let delay = backoff_for(
            &Error::RateLimited { retry_after_secs: 30 },
            0,
            &ReconnectConfig::default(),
        );
        assert_eq!(delay, Duration::from_secs(30));
    }
}
