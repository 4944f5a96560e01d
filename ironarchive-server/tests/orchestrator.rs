use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use health::HealthResult;
use lifecycle::ShutdownOutcome;

use ironarchive_server::connectors::{Connector, ConnectorState};
use ironarchive_server::error::{ConnectorError, StartupError};
use ironarchive_server::orchestrator::{Orchestrator, Phase};

// ---------------------------------------------------------------------------
// Scripted connectors
// ---------------------------------------------------------------------------

/// Shared, ordered record of every call made on the connectors of a test.
#[derive(Clone, Default)]
struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn record(&self, service: &str, call: &str) {
        self.0.lock().unwrap().push(format!("{service}:{call}"));
    }

    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn calls_for(&self, service: &str) -> Vec<String> {
        let prefix = format!("{service}:");
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(&prefix))
            .collect()
    }
}

#[derive(Clone, Copy)]
enum ProbeScript {
    Healthy,
    Unhealthy(&'static str),
    Fails,
    Hangs,
}

struct ScriptedConnector {
    service: &'static str,
    target: &'static str,
    log: CallLog,
    connect_fails: bool,
    probe: ProbeScript,
    close_fails: bool,
    close_takes: Duration,
}

impl ScriptedConnector {
    fn new(service: &'static str, target: &'static str, log: &CallLog) -> Self {
        Self {
            service,
            target,
            log: log.clone(),
            connect_fails: false,
            probe: ProbeScript::Healthy,
            close_fails: false,
            close_takes: Duration::ZERO,
        }
    }

    fn failing_connect(mut self) -> Self {
        self.connect_fails = true;
        self
    }

    fn probing(mut self, probe: ProbeScript) -> Self {
        self.probe = probe;
        self
    }

    fn failing_close(mut self) -> Self {
        self.close_fails = true;
        self
    }

    fn slow_close(mut self, takes: Duration) -> Self {
        self.close_takes = takes;
        self
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn service(&self) -> &'static str {
        self.service
    }

    fn target(&self) -> &str {
        self.target
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        self.log.record(self.service, "connect");
        if self.connect_fails {
            return Err(ConnectorError::Connect {
                service: self.service,
                source: "connection refused".into(),
            });
        }
        Ok(())
    }

    async fn probe(&mut self, _timeout: Duration) -> Result<HealthResult, ConnectorError> {
        self.log.record(self.service, "probe");
        match self.probe {
            ProbeScript::Healthy => Ok(HealthResult::healthy(self.service, "ok", Duration::ZERO)),
            ProbeScript::Unhealthy(status) => Ok(HealthResult::unhealthy(
                self.service,
                format!("status: {status}"),
                Duration::ZERO,
            )),
            ProbeScript::Fails => Err(ConnectorError::Probe {
                service: self.service,
                source: "broken pipe".into(),
            }),
            ProbeScript::Hangs => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        self.log.record(self.service, "close");
        tokio::time::sleep(self.close_takes).await;
        if self.close_fails {
            return Err(ConnectorError::Close {
                service: self.service,
                source: "socket already closed".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const POSTGRES_URL: &str = "postgres://ironarchive:hunter2@db:5432/ironarchive";
const REDIS_URL: &str = "redis://s3cret@cache:6379";
const MEILISEARCH_URL: &str = "http://search:7700";

fn connectors(log: &CallLog) -> [ScriptedConnector; 3] {
    [
        ScriptedConnector::new("postgres", POSTGRES_URL, log),
        ScriptedConnector::new("redis", REDIS_URL, log),
        ScriptedConnector::new("meilisearch", MEILISEARCH_URL, log),
    ]
}

fn orchestrator(connectors: [ScriptedConnector; 3], shutdown_timeout: Duration) -> Orchestrator {
    Orchestrator::new(
        connectors
            .into_iter()
            .map(|c| -> Box<dyn Connector> { Box::new(c) })
            .collect(),
        shutdown_timeout,
    )
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn starts_every_service_in_order() {
    let log = CallLog::default();
    let mut orchestrator = orchestrator(connectors(&log), Duration::from_secs(10));
    assert_eq!(orchestrator.phase(), Phase::Starting);

    let status = orchestrator.start().await.unwrap();

    assert_eq!(
        log.calls(),
        vec![
            "postgres:connect",
            "postgres:probe",
            "redis:connect",
            "redis:probe",
            "meilisearch:connect",
            "meilisearch:probe",
        ]
    );
    assert!(status.healthy);
    assert_eq!(status.components.len(), 3);
    assert_eq!(orchestrator.phase(), Phase::Ready);
    assert!(orchestrator
        .states()
        .iter()
        .all(|(_, state)| *state == ConnectorState::Validated));
}

#[tokio::test]
async fn connect_failure_stops_startup() {
    let log = CallLog::default();
    let [postgres, redis, meilisearch] = connectors(&log);
    let mut orchestrator = orchestrator(
        [postgres, redis.failing_connect(), meilisearch],
        Duration::from_secs(10),
    );

    let err = orchestrator.start().await.unwrap_err();

    match &err {
        StartupError::Connect {
            service, target, ..
        } => {
            assert_eq!(*service, "redis");
            assert_eq!(target, "redis://***@cache:6379");
        }
        other => panic!("expected a connect error, got {other:?}"),
    }
    assert!(!err.to_string().contains("s3cret"));
    assert!(log.calls_for("meilisearch").is_empty());
    assert_eq!(orchestrator.phase(), Phase::Connecting("redis"));
    assert_eq!(
        orchestrator.states(),
        vec![
            ("postgres", ConnectorState::Validated),
            ("redis", ConnectorState::Uninitialized),
            ("meilisearch", ConnectorState::Uninitialized),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn probe_timeout_is_as_fatal_as_a_connect_error() {
    let log = CallLog::default();
    let [postgres, redis, meilisearch] = connectors(&log);
    let mut orchestrator = orchestrator(
        [postgres.probing(ProbeScript::Hangs), redis, meilisearch],
        Duration::from_secs(10),
    );

    let started = tokio::time::Instant::now();
    let err = orchestrator.start().await.unwrap_err();

    assert!(matches!(
        err,
        StartupError::Probe {
            service: "postgres",
            source: ConnectorError::ProbeTimeout {
                service: "postgres",
                timeout,
            },
        } if timeout == Duration::from_secs(5)
    ));
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(log.calls(), vec!["postgres:connect", "postgres:probe"]);
    assert_eq!(orchestrator.phase(), Phase::Validating("postgres"));
}

#[tokio::test]
async fn probe_error_stops_startup() {
    let log = CallLog::default();
    let [postgres, redis, meilisearch] = connectors(&log);
    let mut orchestrator = orchestrator(
        [postgres, redis.probing(ProbeScript::Fails), meilisearch],
        Duration::from_secs(10),
    );

    let err = orchestrator.start().await.unwrap_err();

    assert_eq!(err.service(), "redis");
    assert!(matches!(err, StartupError::Probe { .. }));
    assert!(log.calls_for("meilisearch").is_empty());
}

#[tokio::test]
async fn degraded_search_fails_validation() {
    let log = CallLog::default();
    let [postgres, redis, meilisearch] = connectors(&log);
    let mut orchestrator = orchestrator(
        [postgres, redis, meilisearch.probing(ProbeScript::Unhealthy("degraded"))],
        Duration::from_secs(10),
    );

    let err = orchestrator.start().await.unwrap_err();

    match err {
        StartupError::Unhealthy { service, result } => {
            assert_eq!(service, "meilisearch");
            assert!(!result.healthy);
            assert_eq!(result.detail, "status: degraded");
        }
        other => panic!("expected an unhealthy result, got {other:?}"),
    }
    assert_ne!(orchestrator.phase(), Phase::Ready);
    assert_eq!(
        orchestrator.states()[2],
        ("meilisearch", ConnectorState::Connected)
    );
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_closes_in_reverse_order() {
    let log = CallLog::default();
    let mut orchestrator = orchestrator(connectors(&log), Duration::from_secs(10));
    orchestrator.start().await.unwrap();

    let outcome = orchestrator.shutdown().await;

    assert_eq!(outcome, ShutdownOutcome::Clean);
    assert_eq!(
        log.calls()[6..],
        ["meilisearch:close", "redis:close", "postgres:close"]
    );
    assert_eq!(orchestrator.phase(), Phase::Stopped);
    assert!(orchestrator
        .states()
        .iter()
        .all(|(_, state)| *state == ConnectorState::Closed));
}

#[tokio::test]
async fn close_failure_is_not_escalated() {
    let log = CallLog::default();
    let [postgres, redis, meilisearch] = connectors(&log);
    let mut orchestrator = orchestrator(
        [postgres, redis.failing_close(), meilisearch],
        Duration::from_secs(10),
    );
    orchestrator.start().await.unwrap();

    let outcome = orchestrator.shutdown().await;

    assert!(outcome.is_clean());
    // The failing close does not prevent the next one
    assert_eq!(log.calls_for("postgres").last().unwrap(), "postgres:close");
    assert_eq!(orchestrator.phase(), Phase::Stopped);
}

#[tokio::test(start_paused = true)]
async fn slow_cleanup_is_reported_but_not_interrupted() {
    let log = CallLog::default();
    let [postgres, redis, meilisearch] = connectors(&log);
    let mut orchestrator = orchestrator(
        [
            postgres.slow_close(Duration::from_secs(3)),
            redis,
            meilisearch,
        ],
        Duration::from_secs(1),
    );
    orchestrator.start().await.unwrap();

    let outcome = orchestrator.shutdown().await;

    assert_eq!(
        outcome,
        ShutdownOutcome::TimedOut {
            overrun: Duration::from_secs(2)
        }
    );
    // Every connector was still closed
    assert!(orchestrator
        .states()
        .iter()
        .all(|(_, state)| *state == ConnectorState::Closed));
    assert_eq!(log.calls().len(), 9);
}

#[tokio::test]
async fn shutdown_after_failed_startup_only_closes_what_was_connected() {
    let log = CallLog::default();
    let [postgres, redis, meilisearch] = connectors(&log);
    let mut orchestrator = orchestrator(
        [postgres, redis.failing_connect(), meilisearch],
        Duration::from_secs(10),
    );
    orchestrator.start().await.unwrap_err();

    orchestrator.shutdown().await;

    assert_eq!(
        log.calls(),
        vec![
            "postgres:connect",
            "postgres:probe",
            "redis:connect",
            "postgres:close",
        ]
    );
}

#[tokio::test]
async fn shutdown_twice_closes_once() {
    let log = CallLog::default();
    let mut orchestrator = orchestrator(connectors(&log), Duration::from_secs(10));
    orchestrator.start().await.unwrap();

    orchestrator.shutdown().await;
    orchestrator.shutdown().await;

    assert_eq!(
        log.calls_for("postgres"),
        vec!["postgres:connect", "postgres:probe", "postgres:close"]
    );
}

// ---------------------------------------------------------------------------
// Full lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_holds_connections_until_the_signal() {
    let log = CallLog::default();
    let orchestrator = orchestrator(connectors(&log), Duration::from_secs(10));
    let (tx, rx) = tokio::sync::oneshot::channel::<String>();

    let running = tokio::spawn(async move {
        orchestrator
            .run("localhost:8080", async move {
                rx.await.unwrap_or_else(|_| "sender dropped".to_string())
            })
            .await
    });

    // Wait until startup is over before signalling
    while log.calls().len() < 6 {
        tokio::task::yield_now().await;
    }
    assert!(log.calls().iter().all(|call| !call.ends_with(":close")));

    tx.send("SIGTERM".to_string()).unwrap();
    let outcome = running.await.unwrap().unwrap();

    assert_eq!(outcome, ShutdownOutcome::Clean);
    assert_eq!(log.calls().len(), 9);
}

#[tokio::test]
async fn run_returns_startup_failure_without_waiting_for_a_signal() {
    let log = CallLog::default();
    let [postgres, redis, meilisearch] = connectors(&log);
    let orchestrator = orchestrator(
        [postgres.failing_connect(), redis, meilisearch],
        Duration::from_secs(10),
    );

    let result = orchestrator
        .run("localhost:8080", std::future::pending::<String>())
        .await;

    assert!(matches!(
        result,
        Err(StartupError::Connect {
            service: "postgres",
            ..
        })
    ));
    assert_eq!(log.calls(), vec!["postgres:connect"]);
}
