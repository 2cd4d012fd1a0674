//! Reroutable peer requests: a request that stalls against one peer is
//! resent to the next, bounded by a stall timer, a maximum reroute count,
//! and an absolute wall-clock timeout. The response handler is removed
//! from every peer the request touched on every terminal path — success,
//! failure, or timeout — never just the happy path.

use std::future::Future;
use std::time::{Duration, Instant};

use ledger_core::constants::{
    ABSOLUTE_REQUEST_TIMEOUT_SECS, MAX_REROUTE_COUNT, STALLED_TIMEOUT_SECS,
};
use ledger_core::error::{LedgerError, ProtocolError};

#[derive(Debug, Clone, Copy)]
pub struct RerouteBounds {
    pub stalled_timeout: Duration,
    pub max_reroute_count: u32,
    pub absolute_timeout: Duration,
}

impl Default for RerouteBounds {
    fn default() -> Self {
        Self {
            stalled_timeout: Duration::from_secs(STALLED_TIMEOUT_SECS),
            max_reroute_count: MAX_REROUTE_COUNT,
            absolute_timeout: Duration::from_secs(ABSOLUTE_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Sends a request via `send`, cycling through `peers` on each stall, until
/// one peer answers, a peer-level error is returned, or the bounds in
/// `bounds` are exceeded. `cleanup` is invoked for every peer the request
/// touched, exactly once, on the terminal path — the caller uses it to
/// drop its response-handler registration for that peer.
pub async fn run_reroutable<P, T, Send, Fut, Cleanup>(
    peers: &[P],
    bounds: &RerouteBounds,
    mut send: Send,
    mut cleanup: Cleanup,
) -> Result<T, LedgerError>
where
    P: Clone,
    Send: FnMut(P) -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
    Cleanup: FnMut(&P),
{
    if peers.is_empty() {
        return Err(ProtocolError::PeerUnreachable.into());
    }

    let deadline = Instant::now() + bounds.absolute_timeout;
    let mut touched: Vec<P> = Vec::new();
    let mut reroutes = 0u32;
    let mut peer_index = 0usize;

    loop {
        let now = Instant::now();
        if now >= deadline {
            for p in &touched {
                cleanup(p);
            }
            return Err(ProtocolError::ResponseTimeout { reroutes }.into());
        }

        let peer = peers[peer_index % peers.len()].clone();
        touched.push(peer.clone());

        let remaining = deadline.saturating_duration_since(now);
        let attempt_timeout = bounds.stalled_timeout.min(remaining);

        match tokio::time::timeout(attempt_timeout, send(peer)).await {
            Ok(Ok(value)) => {
                for p in &touched {
                    cleanup(p);
                }
                return Ok(value);
            }
            Ok(Err(err)) => {
                for p in &touched {
                    cleanup(p);
                }
                return Err(err);
            }
            Err(_elapsed) => {
                reroutes += 1;
                if reroutes > bounds.max_reroute_count {
                    for p in &touched {
                        cleanup(p);
                    }
                    return Err(ProtocolError::ResponseTimeout { reroutes }.into());
                }
                peer_index += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_on_first_responsive_peer() {
        let peers = vec!["a".to_string(), "b".to_string()];
        let touched = Arc::new(std::sync::Mutex::new(Vec::new()));
        let bounds = RerouteBounds::default();

        let result = run_reroutable(
            &peers,
            &bounds,
            |peer: String| async move { Ok::<_, LedgerError>(peer) },
            |p: &String| touched.lock().unwrap().push(p.clone()),
        )
        .await
        .unwrap();

        assert_eq!(result, "a");
        assert_eq!(*touched.lock().unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn reroutes_past_a_stalling_peer() {
        let peers = vec!["stalls".to_string(), "answers".to_string()];
        let bounds = RerouteBounds {
            stalled_timeout: Duration::from_millis(20),
            max_reroute_count: 5,
            absolute_timeout: Duration::from_secs(5),
        };
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result = run_reroutable(
            &peers,
            &bounds,
            move |peer: String| {
                attempts_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if peer == "stalls" {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Ok::<_, LedgerError>(peer)
                }
            },
            |_: &String| {},
        )
        .await
        .unwrap();

        assert_eq!(result, "answers");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_peer_list_is_an_error() {
        let peers: Vec<String> = vec![];
        let bounds = RerouteBounds::default();
        let err = run_reroutable(
            &peers,
            &bounds,
            |peer: String| async move { Ok::<_, LedgerError>(peer) },
            |_: &String| {},
        )
        .await
        .unwrap_err();
        match err {
            LedgerError::Protocol(ProtocolError::PeerUnreachable) => {}
            other => panic!("unexpected error: {other}"),
        }
    }
}
