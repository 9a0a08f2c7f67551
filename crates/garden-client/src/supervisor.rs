//! Reconnection with bounded exponential backoff.

use crate::config::ReconnectPolicy;
use crate::error::{SessionError, SessionResult};
use crate::session::Session;
use crate::transport::Connector;
use async_trait::async_trait;
use garden_core::RoomId;
use tokio_util::sync::CancellationToken;

/// Something the supervisor can connect and run repeatedly.
#[async_trait]
pub trait SessionDriver: Send {
    /// Establish a connection.
    async fn connect(&mut self) -> SessionResult<RoomId>;

    /// Drive the established connection until it ends.
    async fn run(&mut self) -> SessionResult<()>;
}

#[async_trait]
impl<C: Connector> SessionDriver for Session<C> {
    async fn connect(&mut self) -> SessionResult<RoomId> {
        Session::connect(self).await
    }

    async fn run(&mut self) -> SessionResult<()> {
        Session::run(self).await
    }
}

/// Keeps a session alive across disconnects.
///
/// Failed attempts and lost connections both count against
/// [`ReconnectPolicy::max_retries`]; a successful connection resets the
/// count.
#[derive(Debug, Clone, Copy, Default)]
pub struct Supervisor {
    policy: ReconnectPolicy,
}

impl Supervisor {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Connect and run `driver` until `stop` is cancelled or retries run out.
    ///
    /// # Errors
    ///
    /// [`SessionError::RetriesExhausted`] once the retry budget is spent,
    /// carrying the last failure, or any non-recoverable connect error.
    pub async fn run<D: SessionDriver>(
        &self,
        driver: &mut D,
        stop: &CancellationToken,
    ) -> SessionResult<()> {
        let mut attempts = 0u32;
        loop {
            let connected = tokio::select! {
                _ = stop.cancelled() => return Ok(()),
                connected = driver.connect() => connected,
            };

            let failure = match connected {
                Ok(room) => {
                    if attempts > 0 {
                        tracing::info!(%room, attempts, "reconnected");
                    }
                    attempts = 0;
                    let outcome = driver.run().await;
                    if stop.is_cancelled() {
                        return Ok(());
                    }
                    match outcome {
                        Ok(()) => {
                            tracing::warn!(%room, "connection lost");
                            None
                        }
                        Err(err) => {
                            tracing::warn!(%room, %err, "connection lost");
                            Some(err)
                        }
                    }
                }
                Err(err) if !err.is_recoverable() => return Err(err),
                Err(err) => {
                    tracing::warn!(%err, "connection attempt failed");
                    Some(err)
                }
            };

            if attempts >= self.policy.max_retries {
                tracing::error!(attempts, "reconnection attempts exhausted");
                return Err(SessionError::RetriesExhausted {
                    attempts,
                    last: failure.map(Box::new),
                });
            }
            attempts += 1;
            let delay = self.policy.delay_for(attempts);
            tracing::info!(
                attempt = attempts,
                max = self.policy.max_retries,
                delay_secs = delay.as_secs(),
                "reconnecting"
            );
            tokio::select! {
                _ = stop.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use assert_matches::assert_matches;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Replays scripted connect outcomes and records when each attempt ran.
    struct Scripted {
        connects: VecDeque<SessionResult<RoomId>>,
        attempts: Vec<Instant>,
        runs: usize,
    }

    impl Scripted {
        fn new(connects: Vec<SessionResult<RoomId>>) -> Self {
            Self {
                connects: connects.into(),
                attempts: Vec::new(),
                runs: 0,
            }
        }

        fn gaps(&self) -> Vec<u64> {
            self.attempts
                .windows(2)
                .map(|w| (w[1] - w[0]).as_secs())
                .collect()
        }
    }

    #[async_trait]
    impl SessionDriver for Scripted {
        async fn connect(&mut self) -> SessionResult<RoomId> {
            self.attempts.push(Instant::now());
            self.connects
                .pop_front()
                .unwrap_or(Err(SessionError::NoRoomAvailable { tried: 1 }))
        }

        async fn run(&mut self) -> SessionResult<()> {
            self.runs += 1;
            Err(TransportError::Closed.into())
        }
    }

    fn policy(max_retries: u32) -> Supervisor {
        Supervisor::new(ReconnectPolicy {
            max_retries,
            base_delay: 5,
            max_delay: 60,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn backs_off_exponentially_then_gives_up() {
        let mut driver = Scripted::new(vec![]);
        let err = policy(5)
            .run(&mut driver, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_matches!(
            err,
            SessionError::RetriesExhausted { attempts: 5, last: Some(last) }
                if matches!(*last, SessionError::NoRoomAvailable { .. })
        );
        assert_eq!(driver.attempts.len(), 6);
        assert_eq!(driver.gaps(), vec![5, 10, 20, 40, 60]);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_connection_resets_the_count() {
        let room = || Ok(RoomId::new("MG1"));
        let fail = || Err(SessionError::NoRoomAvailable { tried: 1 });
        let mut driver = Scripted::new(vec![fail(), room(), fail(), fail()]);

        let err = policy(2)
            .run(&mut driver, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_matches!(err, SessionError::RetriesExhausted { attempts: 2, .. });
        assert_eq!(driver.runs, 1);
        // fail, (5s) connect+run lost, (5s) fail, (10s) fail
        assert_eq!(driver.gaps(), vec![5, 5, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_stops_after_first_loss() {
        let mut driver = Scripted::new(vec![Ok(RoomId::new("MG1"))]);
        let err = policy(0)
            .run(&mut driver, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(
            err,
            SessionError::RetriesExhausted { attempts: 0, last: Some(last) } if last.is_disconnect()
        );
        assert_eq!(driver.attempts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_candidates_is_terminal() {
        let mut driver = Scripted::new(vec![Err(SessionError::NoRoomCandidates)]);
        let err = policy(5)
            .run(&mut driver, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, SessionError::NoRoomCandidates);
        assert_eq!(driver.attempts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_backoff() {
        let stop = CancellationToken::new();
        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });

        let mut driver = Scripted::new(vec![]);
        let started = Instant::now();
        policy(5).run(&mut driver, &stop).await.unwrap();

        assert_eq!(driver.attempts.len(), 2);
        assert!(started.elapsed() < Duration::from_secs(15));
    }
}
