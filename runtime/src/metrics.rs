//! Prometheus metrics for the reservation engine.
//!
//! Metric names live here as constants so the engine and dashboards agree on them.
//! Recording goes through the `metrics` facade; until [`MetricsServer::start`]
//! installs a recorder every call is a no-op, which keeps tests quiet.
//!
//! # Example
//!
//! ```rust,no_run
//! use gym_runtime::metrics::{MetricsServer, ReservationMetrics};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! ReservationMetrics::record_created();
//! println!("{}", server.render().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use metrics_util::MetricKindMask;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Reservations committed
pub const RESERVATIONS_CREATED: &str = "gym_reservations_created_total";
/// Reservation requests rejected, labelled by `reason`
pub const RESERVATIONS_REJECTED: &str = "gym_reservations_rejected_total";
/// Reservations cancelled
pub const RESERVATIONS_CANCELLED: &str = "gym_reservations_cancelled_total";
/// Attendance marks, labelled by `outcome`
pub const ATTENDANCE_MARKED: &str = "gym_attendance_marked_total";
/// Lock acquisitions that hit their deadline, labelled by `resource`
pub const LOCK_TIMEOUTS: &str = "gym_lock_timeouts_total";
/// Time spent waiting for a keyed lock, labelled by `resource`
pub const LOCK_WAIT_DURATION: &str = "gym_lock_wait_duration_seconds";
/// Reserved spots per session, labelled by `session_id`
pub const SESSION_RESERVED_SPOTS: &str = "gym_session_reserved_spots";

/// Gauge series not updated for this long are dropped from the exposition.
pub const GAUGE_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder holder.
///
/// Installs the global recorder and renders the text exposition on demand.
/// Serving it over HTTP is left to the embedding application.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new, not yet started, metrics server.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the embedding application should expose `/metrics` on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// A second installation in the same process is tolerated: the first recorder stays
    /// active and this server's [`render`](Self::render) returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the bucket configuration is rejected, or
    /// [`MetricsError::Install`] for any other installation failure.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .idle_timeout(MetricKindMask::GAUGE, Some(GAUGE_IDLE_TIMEOUT))
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(BuildError::FailedToSetGlobalRecorder(_)) => {
                tracing::warn!("Metrics recorder already installed, keeping the existing one");
                Ok(())
            }
            Err(e) => Err(MetricsError::Install(e.to_string())),
        }
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(RESERVATIONS_CREATED, "Reservations committed");
    describe_counter!(
        RESERVATIONS_REJECTED,
        "Reservation requests rejected, by error code"
    );
    describe_counter!(RESERVATIONS_CANCELLED, "Reservations cancelled");
    describe_counter!(
        ATTENDANCE_MARKED,
        "Attendance marks, by outcome (completed or missed)"
    );
    describe_counter!(
        LOCK_TIMEOUTS,
        "Keyed lock acquisitions that hit their deadline"
    );
    describe_histogram!(
        LOCK_WAIT_DURATION,
        metrics::Unit::Seconds,
        "Time spent waiting for a keyed lock"
    );
    describe_gauge!(SESSION_RESERVED_SPOTS, "Reserved spots per session");
}

/// Reservation lifecycle metrics recorder.
pub struct ReservationMetrics;

impl ReservationMetrics {
    /// Record a committed reservation.
    pub fn record_created() {
        counter!(RESERVATIONS_CREATED).increment(1);
    }

    /// Record a rejected reservation request.
    pub fn record_rejected(reason: &'static str) {
        counter!(RESERVATIONS_REJECTED, "reason" => reason).increment(1);
    }

    /// Record a cancellation.
    pub fn record_cancelled() {
        counter!(RESERVATIONS_CANCELLED).increment(1);
    }

    /// Record an attendance mark.
    pub fn record_attendance(attended: bool) {
        let outcome = if attended { "completed" } else { "missed" };
        counter!(ATTENDANCE_MARKED, "outcome" => outcome).increment(1);
    }

    /// Publish a session's current reserved spots.
    pub fn record_reserved_spots(session_id: String, reserved: u32) {
        gauge!(SESSION_RESERVED_SPOTS, "session_id" => session_id).set(f64::from(reserved));
    }
}

/// Keyed lock metrics recorder.
pub struct LockMetrics;

impl LockMetrics {
    /// Record how long a successful acquisition waited.
    pub fn record_wait(resource: &'static str, waited: Duration) {
        histogram!(LOCK_WAIT_DURATION, "resource" => resource).record(waited.as_secs_f64());
    }

    /// Record an acquisition that hit its deadline.
    pub fn record_timeout(resource: &'static str) {
        counter!(LOCK_TIMEOUTS, "resource" => resource).increment(1);
    }
}
