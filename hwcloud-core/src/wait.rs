//! Wait - Poll a remote object until it reaches a target status
//!
//! Every resource handler that has to wait for an asynchronous cloud
//! operation describes the wait with a [`StateChangeConf`] and supplies a
//! refresh function that reports the current status.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::provider::{ErrorKind, ProviderError, ProviderResult};

const INITIAL_WAIT: Duration = Duration::from_millis(100);
const MAX_WAIT: Duration = Duration::from_secs(10);

/// Result of a single refresh
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<T> {
    /// The object exists and is in the given state
    Found(T, String),
    /// The object is gone and this is reported as the given state
    /// (e.g. `DELETED` for a zone that answers 404)
    Gone(String),
    /// The object could not be found
    Missing,
}

/// Describes how to wait for a status transition
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    /// Wait before the first refresh
    pub delay: Duration,
    /// Fixed interval between refreshes; exponential backoff when unset
    pub poll_interval: Option<Duration>,
    /// Lower bound for the exponential backoff
    pub min_timeout: Duration,
    pub timeout: Duration,
    /// Consecutive misses tolerated before failing with not-found
    pub not_found_checks: usize,
    /// Consecutive target observations required for success
    pub continuous_target_occurrence: usize,
    /// Upper bound on the initial delay and every pause between refreshes
    pub max_wait: Option<Duration>,
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str], timeout: Duration) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            delay: Duration::ZERO,
            poll_interval: None,
            min_timeout: Duration::ZERO,
            timeout,
            not_found_checks: 20,
            continuous_target_occurrence: 1,
            max_wait: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn with_min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn with_not_found_checks(mut self, checks: usize) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn with_continuous_target_occurrence(mut self, occurrence: usize) -> Self {
        self.continuous_target_occurrence = occurrence.max(1);
        self
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    fn capped(&self, wait: Duration) -> Duration {
        self.max_wait.map_or(wait, |max| wait.min(max))
    }

    /// Refresh until the object reaches one of the target states.
    ///
    /// Returns the value of the last refresh, or `None` when the object is
    /// gone or missing and that was the expected outcome.
    pub async fn wait_for_state<T, F, Fut>(&self, mut refresh: F) -> ProviderResult<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<Observation<T>>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut last_state = String::new();
        let mut wait = INITIAL_WAIT;
        let mut target_occurrence = 0;
        let mut not_found_tick = 0;

        log::debug!(
            "Waiting {} for state to become: {:?}",
            format_duration(self.timeout),
            self.target
        );

        let delay = self.capped(self.delay);
        if !delay.is_zero() {
            if Instant::now() + delay >= deadline {
                tokio::time::sleep_until(deadline).await;
                return Err(self.timeout_error(&last_state));
            }
            tokio::time::sleep(delay).await;
        }

        loop {
            let observation = match tokio::time::timeout_at(deadline, refresh()).await {
                Ok(result) => result?,
                Err(_) => return Err(self.timeout_error(&last_state)),
            };

            let (value, state) = match observation {
                Observation::Found(value, state) => (Some(value), state),
                Observation::Gone(state) => (None, state),
                Observation::Missing => {
                    log::debug!("Refresh returned no object");
                    target_occurrence = 0;
                    if self.target.is_empty() {
                        return Ok(None);
                    }
                    not_found_tick += 1;
                    if not_found_tick > self.not_found_checks {
                        return Err(ProviderError::not_found(format!(
                            "couldn't find resource ({} retries)",
                            self.not_found_checks
                        )));
                    }
                    self.sleep_before_next(&mut wait, target_occurrence, deadline, &last_state)
                        .await?;
                    continue;
                }
            };

            not_found_tick = 0;
            log::debug!("Refreshed state: {}", state);

            if self.target.contains(&state) {
                target_occurrence += 1;
                if target_occurrence >= self.continuous_target_occurrence {
                    return Ok(value);
                }
            } else if self.pending.contains(&state) {
                target_occurrence = 0;
            } else {
                return Err(ProviderError::with_kind(
                    ErrorKind::UnexpectedState,
                    format!(
                        "unexpected state '{}', wanted target '{}'",
                        state,
                        self.target.join(", ")
                    ),
                ));
            }

            last_state = state;
            self.sleep_before_next(&mut wait, target_occurrence, deadline, &last_state)
                .await?;
        }
    }

    async fn sleep_before_next(
        &self,
        wait: &mut Duration,
        target_occurrence: usize,
        deadline: Instant,
        last_state: &str,
    ) -> ProviderResult<()> {
        // Keep the interval steady while counting consecutive target hits
        if target_occurrence == 0 {
            *wait *= 2;
        }
        if let Some(interval) = self.poll_interval {
            *wait = interval;
        } else if *wait < self.min_timeout {
            *wait = self.min_timeout;
        } else if *wait > MAX_WAIT {
            *wait = MAX_WAIT;
        }

        let pause = self.capped(*wait);
        if Instant::now() + pause >= deadline {
            tokio::time::sleep_until(deadline).await;
            return Err(self.timeout_error(last_state));
        }
        tokio::time::sleep(pause).await;
        Ok(())
    }

    fn timeout_error(&self, last_state: &str) -> ProviderError {
        ProviderError::timeout(format!(
            "timeout while waiting for state to become '{}' (last state: '{}', timeout: {})",
            self.target.join(", "),
            last_state,
            format_duration(self.timeout)
        ))
    }
}

/// Parse a duration such as `"10m"`, `"1h30m"`, `"45s"` or `"500ms"`
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if input == "0" {
        return Some(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit())?;
        if digits == 0 {
            return None;
        }
        let amount: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = match &rest[..unit_len] {
            "h" => Duration::from_secs(3600),
            "m" => Duration::from_secs(60),
            "s" => Duration::from_secs(1),
            "ms" => Duration::from_millis(1),
            _ => return None,
        };
        total += unit * u32::try_from(amount).ok()?;
        rest = &rest[unit_len..];
    }
    Some(total)
}

/// Format a duration the way timeouts are written in configuration
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        return format!("{}ms", duration.as_millis());
    }
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else if m > 0 {
        format!("{}m{}s", m, s)
    } else {
        format!("{}s", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Refresh function replaying `script`, repeating the last entry forever
    fn scripted(
        script: Vec<Observation<&'static str>>,
    ) -> (
        Arc<AtomicUsize>,
        impl FnMut() -> std::future::Ready<ProviderResult<Observation<&'static str>>>,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let refresh = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let obs = script[n.min(script.len() - 1)].clone();
            std::future::ready(Ok(obs))
        };
        (calls, refresh)
    }

    fn found(state: &str) -> Observation<&'static str> {
        Observation::Found("vpc", state.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_target_after_pending() {
        let conf = StateChangeConf::new(&["CREATING"], &["OK"], Duration::from_secs(600))
            .with_poll_interval(Duration::from_secs(5));
        let (calls, refresh) = scripted(vec![found("CREATING"), found("CREATING"), found("OK")]);

        let result = conf.wait_for_state(refresh).await.unwrap();
        assert_eq!(result, Some("vpc"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_last_state() {
        let conf = StateChangeConf::new(&["CREATING"], &["OK"], Duration::from_secs(60))
            .with_poll_interval(Duration::from_secs(5));
        let (_, refresh) = scripted(vec![found("CREATING")]);

        let start = Instant::now();
        let err = conf.wait_for_state(refresh).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.message.contains("last state: 'CREATING'"));
        assert!(err.message.contains("'OK'"));
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_longer_than_timeout_times_out() {
        let conf = StateChangeConf::new(&["CREATING"], &["OK"], Duration::from_secs(10))
            .with_delay(Duration::from_secs(20));
        let (calls, refresh) = scripted(vec![found("OK")]);

        let err = conf.wait_for_state(refresh).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_state_aborts() {
        let conf = StateChangeConf::new(&["Creating"], &["Available"], Duration::from_secs(600));
        let (calls, refresh) = scripted(vec![found("Creating"), found("Error")]);

        let err = conf.wait_for_state(refresh).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedState);
        assert!(err.message.contains("'Error'"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_fails_after_not_found_checks() {
        let conf = StateChangeConf::new(&["PENDING"], &["ACTIVE"], Duration::from_secs(3600))
            .with_not_found_checks(3);
        let (calls, refresh) = scripted(vec![Observation::Missing]);

        let err = conf.wait_for_state(refresh).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_counter_resets_on_found() {
        let conf = StateChangeConf::new(&["PENDING"], &["ACTIVE"], Duration::from_secs(3600))
            .with_not_found_checks(2);
        let (_, refresh) = scripted(vec![
            Observation::Missing,
            Observation::Missing,
            found("PENDING"),
            Observation::Missing,
            Observation::Missing,
            found("ACTIVE"),
        ]);

        assert_eq!(conf.wait_for_state(refresh).await.unwrap(), Some("vpc"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_is_success_without_target() {
        let conf = StateChangeConf::new(&["ACTIVE"], &[], Duration::from_secs(600));
        let (_, refresh) = scripted(vec![found("ACTIVE"), Observation::Missing]);

        assert_eq!(conf.wait_for_state(refresh).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn gone_state_can_be_the_target() {
        let conf = StateChangeConf::new(&["ACTIVE", "PENDING"], &["DELETED"], Duration::from_secs(600));
        let (_, refresh) = scripted(vec![found("PENDING"), Observation::Gone("DELETED".into())]);

        assert_eq!(conf.wait_for_state(refresh).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_target_occurrence_restarts_on_pending() {
        let conf = StateChangeConf::new(&["PENDING"], &["ACTIVE"], Duration::from_secs(600))
            .with_continuous_target_occurrence(3);
        let (calls, refresh) = scripted(vec![
            found("ACTIVE"),
            found("PENDING"),
            found("ACTIVE"),
            found("ACTIVE"),
            found("ACTIVE"),
        ]);

        conf.wait_for_state(refresh).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_error_propagates_immediately() {
        let conf = StateChangeConf::new(&["PENDING"], &["ACTIVE"], Duration::from_secs(600));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let err = conf
            .wait_for_state(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err::<Observation<()>, _>(ProviderError::with_kind(
                    ErrorKind::Api {
                        status: 500,
                        code: Some("DNS.0001".into()),
                    },
                    "internal error",
                )))
            })
            .await
            .unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Api {
                status: 500,
                code: Some("DNS.0001".into())
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_respects_min_timeout() {
        let conf = StateChangeConf::new(&["PENDING"], &["ACTIVE"], Duration::from_secs(600))
            .with_min_timeout(Duration::from_secs(3));
        let (_, refresh) = scripted(vec![found("PENDING"), found("PENDING"), found("ACTIVE")]);

        let start = Instant::now();
        conf.wait_for_state(refresh).await.unwrap();
        // raised to the 3s floor, then doubled from there
        assert_eq!(start.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn max_wait_caps_delay_and_interval() {
        let conf = StateChangeConf::new(&["Running"], &["Success"], Duration::from_secs(600))
            .with_delay(Duration::from_secs(150))
            .with_poll_interval(Duration::from_secs(20))
            .with_max_wait(Some(Duration::from_millis(10)));
        let (_, refresh) = scripted(vec![found("Running"), found("Success")]);

        let start = Instant::now();
        conf.wait_for_state(refresh).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(20));
    }

    #[test]
    fn parse_durations() {
        assert_eq!(parse_duration("10m"), Some(Duration::from_secs(600)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("45s"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("m10"), None);
        assert_eq!(parse_duration("10x"), None);
    }

    #[test]
    fn format_durations() {
        assert_eq!(format_duration(Duration::from_secs(600)), "10m0s");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m0s");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
    }
}
