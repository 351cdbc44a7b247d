use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use log::{error, info, warn};
use serde_json::{Value, json};

use crate::config::constants;
use crate::error::{ActuationError, ConfigError};
use crate::pacing::{Sleeper, ThreadSleeper};

/// Protective command sent to the printer when a failure is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Pause the running job.
    Pause,
    /// Cancel the running job.
    Cancel,
    /// Send the configured raw G-code line.
    Gcode,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Pause => "pause",
            ActionKind::Cancel => "cancel",
            ActionKind::Gcode => "gcode",
        }
    }

    /// Build the OctoPrint endpoint and JSON body for this action.
    ///
    /// # Arguments
    ///
    /// * `base_url` - OctoPrint base URL without a trailing slash
    /// * `raw_command` - G-code line used by [`ActionKind::Gcode`]
    pub fn request(&self, base_url: &str, raw_command: &str) -> (String, Value) {
        match self {
            ActionKind::Pause => (
                format!("{}/api/job", base_url),
                json!({"command": "pause", "action": "pause"}),
            ),
            ActionKind::Cancel => (format!("{}/api/job", base_url), json!({"command": "cancel"})),
            ActionKind::Gcode => (
                format!("{}/api/printer/command", base_url),
                json!({"command": raw_command}),
            ),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(ActionKind::Pause),
            "cancel" => Ok(ActionKind::Cancel),
            "gcode" => Ok(ActionKind::Gcode),
            _ => Err(ConfigError::UnknownAction {
                value: s.to_string(),
            }),
        }
    }
}

/// Response from the printer controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub status: u16,
    pub body: String,
}

impl Ack {
    /// Any 2xx status counts as accepted.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into [`ActuationError::Rejected`].
    pub fn into_result(self) -> Result<Ack, ActuationError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ActuationError::Rejected {
                status: self.status,
                body: truncate(&self.body, 120).to_string(),
            })
        }
    }
}

/// Sends one JSON request to the printer controller.
pub trait Transport {
    /// POST `body` to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ActuationError::Transport`] when no response was received.
    /// A non-2xx response is still `Ok`.
    fn post(&self, url: &str, body: &Value) -> Result<Ack, ActuationError>;
}

/// Blocking HTTP transport carrying the static OctoPrint API key.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    api_key: String,
}

impl HttpTransport {
    /// Create a transport that authenticates with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (e.g. TLS backend failure).
    pub fn new(api_key: String) -> Result<Self, ActuationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(constants::HTTP_TIMEOUT)
            .build()
            .map_err(|e| ActuationError::Transport {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, api_key })
    }
}

impl Transport for HttpTransport {
    fn post(&self, url: &str, body: &Value) -> Result<Ack, ActuationError> {
        let transport_err = |e: reqwest::Error| ActuationError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .post(url)
            .header("X-Api-Key", &self.api_key)
            .json(body)
            .send()
            .map_err(transport_err)?;

        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        Ok(Ack { status, body })
    }
}

/// How many times to try an action and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub step: Duration,
}

impl RetryPolicy {
    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.step * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: constants::ACTUATION_ATTEMPTS,
            step: constants::ACTUATION_RETRY_STEP,
        }
    }
}

/// Printer control client for the OctoPrint REST API.
///
/// Wraps a [`Transport`] with bounded, linearly backed-off retries and a
/// dry-run switch. Callers only see the final boolean.
pub struct ActuatorClient<T: Transport = HttpTransport, P: Sleeper = ThreadSleeper> {
    transport: T,
    sleeper: P,
    base_url: String,
    raw_command: String,
    dry_run: bool,
    policy: RetryPolicy,
}

impl<T: Transport, P: Sleeper> ActuatorClient<T, P> {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `transport` - Where requests go
    /// * `sleeper` - Used for the delay between attempts
    /// * `base_url` - OctoPrint base URL (e.g. "http://octopi.local")
    /// * `raw_command` - G-code sent for [`ActionKind::Gcode`]
    /// * `dry_run` - When true, log the action and report success without any request
    pub fn new(
        transport: T,
        sleeper: P,
        base_url: impl Into<String>,
        raw_command: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            transport,
            sleeper,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            raw_command: raw_command.into(),
            dry_run,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Send `action` to the printer.
    ///
    /// Returns `true` on the first attempt the controller accepts, `false`
    /// once every attempt has failed. Each attempt is logged.
    pub fn send(&mut self, action: ActionKind) -> bool {
        if self.dry_run {
            info!("[DRY-RUN] Would {}", action);
            return true;
        }

        let (url, body) = action.request(&self.base_url, &self.raw_command);
        let attempts = self.policy.attempts.max(1);

        for attempt in 1..=attempts {
            let outcome = self.transport.post(&url, &body).and_then(|ack| {
                info!(
                    "OctoPrint {} -> {} {}",
                    action,
                    ack.status,
                    truncate(&ack.body, 120)
                );
                ack.into_result()
            });

            match outcome {
                Ok(_) => return true,
                Err(e) => {
                    warn!(
                        "OctoPrint call failed (attempt {}/{}): {}",
                        attempt, attempts, e
                    );
                }
            }

            if attempt < attempts {
                self.sleeper.sleep(self.policy.delay_after(attempt));
            }
        }

        error!("OctoPrint {}: {}", action, ActuationError::Exhausted { attempts });
        false
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
