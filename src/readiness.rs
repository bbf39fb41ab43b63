//! Bounded wait for the server to accept connections

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::ServerConfig;

/// How long to keep probing, and how often
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
   /// Give up once this much time has passed since the first attempt
   pub max_wait: Duration,
   /// Pause between a failed attempt and the next one
   pub interval: Duration,
}

impl Default for ReadinessPolicy {
   fn default() -> Self {
      Self {
         max_wait: Duration::from_secs(10),
         interval: Duration::from_millis(500),
      }
   }
}

impl From<&ServerConfig> for ReadinessPolicy {
   fn from(config: &ServerConfig) -> Self {
      Self {
         max_wait: config.startup_timeout,
         interval: config.poll_interval,
      }
   }
}

/// Outcome of a single probe attempt
#[derive(Debug)]
pub enum Attempt<E> {
   Ready,
   /// Not ready yet; worth trying again
   NotYet(E),
   /// Will never become ready; stop immediately
   GiveUp(E),
}

/// A single readiness check, retried by [`wait_until_ready`]
pub trait Probe {
   type Error;

   fn attempt(&mut self) -> impl Future<Output = Attempt<Self::Error>> + Send;
}

/// Why the wait ended without the server becoming ready
#[derive(Debug)]
pub enum Unready<E> {
   TimedOut {
      waited: Duration,
      attempts: u32,
      /// Error of the most recent attempt
      last_error: Option<E>,
   },
   GaveUp {
      attempts: u32,
      error: E,
   },
}

/// Retry `probe` until it reports ready, gives up, or `policy.max_wait`
/// has elapsed. Returns the number of attempts made.
///
/// At least one attempt is always made. Sleeps never run past the deadline.
pub async fn wait_until_ready<P>(
   policy: &ReadinessPolicy,
   probe: &mut P,
) -> Result<u32, Unready<P::Error>>
where
   P: Probe,
   P::Error: fmt::Display,
{
   let started = Instant::now();
   let deadline = started + policy.max_wait;
   let mut attempts = 0;

   loop {
      attempts += 1;

      let last_error = match probe.attempt().await {
         Attempt::Ready => {
            info!(attempts, elapsed = ?started.elapsed(), "Server is accepting connections");
            return Ok(attempts);
         }
         Attempt::GiveUp(error) => {
            debug!(attempts, %error, "Readiness probe gave up");
            return Err(Unready::GaveUp { attempts, error });
         }
         Attempt::NotYet(error) => {
            trace!(attempts, %error, "Server not ready yet");
            error
         }
      };

      let now = Instant::now();
      if now >= deadline {
         debug!(attempts, "Server did not become ready in {:?}", policy.max_wait);
         return Err(Unready::TimedOut {
            waited: now - started,
            attempts,
            last_error: Some(last_error),
         });
      }

      tokio::time::sleep(policy.interval.min(deadline - now)).await;
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   /// Fails `failures` times, then succeeds. Each attempt takes `cost`.
   struct Scripted {
      failures: u32,
      cost: Duration,
      calls: u32,
   }

   impl Scripted {
      fn new(failures: u32) -> Self {
         Self {
            failures,
            cost: Duration::ZERO,
            calls: 0,
         }
      }
   }

   impl Probe for Scripted {
      type Error = String;

      fn attempt(&mut self) -> impl Future<Output = Attempt<String>> + Send {
         self.calls += 1;
         let call = self.calls;
         let failures = self.failures;
         let cost = self.cost;

         async move {
            tokio::time::sleep(cost).await;
            if call > failures {
               Attempt::Ready
            } else {
               Attempt::NotYet(format!("refused #{}", call))
            }
         }
      }
   }

   struct Exits;

   impl Probe for Exits {
      type Error = &'static str;

      fn attempt(&mut self) -> impl Future<Output = Attempt<&'static str>> + Send {
         async { Attempt::GiveUp("exited") }
      }
   }

   #[tokio::test(start_paused = true)]
   async fn test_ready_on_first_attempt() {
      let attempts = wait_until_ready(&ReadinessPolicy::default(), &mut Scripted::new(0))
         .await
         .unwrap();
      assert_eq!(attempts, 1);
   }

   #[tokio::test(start_paused = true)]
   async fn test_retries_at_interval_until_ready() {
      let started = Instant::now();
      let mut probe = Scripted::new(3);

      let attempts = wait_until_ready(&ReadinessPolicy::default(), &mut probe)
         .await
         .unwrap();

      assert_eq!(attempts, 4);
      assert_eq!(started.elapsed(), Duration::from_millis(1500));
   }

   #[tokio::test(start_paused = true)]
   async fn test_times_out_with_last_error() {
      let started = Instant::now();
      let mut probe = Scripted::new(u32::MAX);

      let err = wait_until_ready(&ReadinessPolicy::default(), &mut probe)
         .await
         .unwrap_err();

      match err {
         Unready::TimedOut {
            waited,
            attempts,
            last_error,
         } => {
            // 0, 500, ..., 10000 ms
            assert_eq!(attempts, 21);
            assert_eq!(waited, Duration::from_secs(10));
            assert_eq!(last_error.as_deref(), Some("refused #21"));
         }
         other => panic!("expected a timeout, got {:?}", other),
      }
      assert_eq!(started.elapsed(), Duration::from_secs(10));
   }

   #[tokio::test(start_paused = true)]
   async fn test_sleep_is_capped_at_deadline() {
      let policy = ReadinessPolicy {
         max_wait: Duration::from_millis(1200),
         interval: Duration::from_millis(500),
      };
      let started = Instant::now();

      let err = wait_until_ready(&policy, &mut Scripted::new(u32::MAX))
         .await
         .unwrap_err();

      assert!(matches!(err, Unready::TimedOut { attempts: 4, .. }));
      assert_eq!(started.elapsed(), Duration::from_millis(1200));
   }

   #[tokio::test(start_paused = true)]
   async fn test_slow_attempts_count_against_the_deadline() {
      let mut probe = Scripted {
         failures: u32::MAX,
         cost: Duration::from_secs(4),
         calls: 0,
      };

      let err = wait_until_ready(&ReadinessPolicy::default(), &mut probe)
         .await
         .unwrap_err();

      // Attempts at 0s, 4.5s, 9s each take 4s; the third ends past 10s
      assert!(matches!(err, Unready::TimedOut { attempts: 3, .. }));
   }

   #[tokio::test(start_paused = true)]
   async fn test_give_up_stops_immediately() {
      let started = Instant::now();

      let err = wait_until_ready(&ReadinessPolicy::default(), &mut Exits)
         .await
         .unwrap_err();

      assert!(matches!(err, Unready::GaveUp { attempts: 1, error: "exited" }));
      assert_eq!(started.elapsed(), Duration::ZERO);
   }

   #[test]
   fn test_policy_from_config() {
      let config = ServerConfig {
         startup_timeout: Duration::from_secs(3),
         poll_interval: Duration::from_millis(50),
         ..Default::default()
      };
      let policy = ReadinessPolicy::from(&config);
      assert_eq!(policy.max_wait, Duration::from_secs(3));
      assert_eq!(policy.interval, Duration::from_millis(50));
   }
}
