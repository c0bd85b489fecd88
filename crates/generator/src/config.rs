//! Configuration types for the load generator.

use std::time::Duration;

/// Engine-wide settings shared by every phase.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// Timeout applied to every outbound network call.
    pub request_timeout: Duration,

    /// Retries of a retryable submission failure in the one-shot
    /// send-and-wait path (setup transactions).
    pub submit_retries: u32,

    /// Retryable failures in a row after which `send_all` gives up.
    pub max_consecutive_failures: u32,

    /// How long to wait for a setup transaction to be included.
    pub setup_wait: WaitConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            submit_retries: 3,
            max_consecutive_failures: 10,
            setup_wait: WaitConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the number of submission retries.
    pub fn with_submit_retries(mut self, retries: u32) -> Self {
        self.submit_retries = retries;
        self
    }

    /// Set the consecutive failure budget of `send_all`.
    pub fn with_max_consecutive_failures(mut self, failures: u32) -> Self {
        self.max_consecutive_failures = failures;
        self
    }

    /// Set the wait policy used for setup transactions.
    pub fn with_setup_wait(mut self, wait: WaitConfig) -> Self {
        self.setup_wait = wait;
        self
    }
}

/// When `send_all` stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopPolicy {
    /// After this many successful submissions.
    Count(u64),
    /// After this much wall-clock time.
    Duration(Duration),
    /// Never (until cancelled).
    Infinite,
}

impl StopPolicy {
    /// Whether the loop should stop before starting another tick.
    pub fn is_finished(&self, sent: u64, elapsed: Duration) -> bool {
        match *self {
            StopPolicy::Count(count) => sent >= count,
            StopPolicy::Duration(duration) => elapsed >= duration,
            StopPolicy::Infinite => false,
        }
    }
}

/// Configuration of one `send_all` run.
#[derive(Clone, Debug, PartialEq)]
pub struct SendConfig {
    /// Number of transactions to send. Takes precedence over `duration`.
    pub count: Option<u64>,

    /// How long to keep sending.
    pub duration: Option<Duration>,

    /// Minimal time between the starts of two pacing ticks.
    pub interval: Option<Duration>,

    /// Number of transactions sent in one pacing tick.
    pub pack_size: usize,

    /// Switch to the next endpoint once per tick.
    pub rotate_nodes: bool,

    /// Pull a (possibly different) template from the store once per tick.
    pub rotate_senders: bool,

    /// Validity window handed to the signer.
    pub valid_time: Option<Duration>,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            count: Some(1),
            duration: None,
            interval: None,
            pack_size: 1,
            rotate_nodes: false,
            rotate_senders: false,
            valid_time: None,
        }
    }
}

impl SendConfig {
    /// Send exactly `count` transactions.
    pub fn count(count: u64) -> Self {
        Self {
            count: Some(count),
            ..Default::default()
        }
    }

    /// Keep sending for `duration`.
    pub fn duration(duration: Duration) -> Self {
        Self {
            count: None,
            duration: Some(duration),
            ..Default::default()
        }
    }

    /// Keep sending until cancelled.
    pub fn infinite() -> Self {
        Self {
            count: None,
            duration: None,
            ..Default::default()
        }
    }

    /// Set the pacing interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Set the number of transactions per tick.
    pub fn with_pack_size(mut self, pack_size: usize) -> Self {
        self.pack_size = pack_size;
        self
    }

    /// Rotate endpoints once per tick.
    pub fn with_rotate_nodes(mut self, rotate: bool) -> Self {
        self.rotate_nodes = rotate;
        self
    }

    /// Rotate fee payers once per tick.
    pub fn with_rotate_senders(mut self, rotate: bool) -> Self {
        self.rotate_senders = rotate;
        self
    }

    /// Set the validity window of signed transactions.
    pub fn with_valid_time(mut self, valid_time: Duration) -> Self {
        self.valid_time = Some(valid_time);
        self
    }

    /// The authoritative stopping condition.
    pub fn stop_policy(&self) -> StopPolicy {
        match (self.count, self.duration) {
            (Some(count), _) => StopPolicy::Count(count),
            (None, Some(duration)) => StopPolicy::Duration(duration),
            (None, None) => StopPolicy::Infinite,
        }
    }
}

/// How long to wait for inclusion of one transaction.
///
/// Defaults: 20s * 30 attempts * 6 retries, about an hour per transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct WaitConfig {
    /// Retries after the first round of status checks.
    pub max_retries: u32,

    /// Status checks in one round.
    pub attempts_per_retry: u32,

    /// Time between two status checks.
    pub poll_interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_retries: 6,
            attempts_per_retry: 30,
            poll_interval: Duration::from_secs(20),
        }
    }
}

impl WaitConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_attempts_per_retry(mut self, attempts: u32) -> Self {
        self.attempts_per_retry = attempts;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
