//! Single TCP reachability check.

use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, instrument};

use crate::core::budget::remaining_budget;
use crate::core::endpoint::Endpoint;

/// Abstraction over reachability checks.
///
/// Implementations never fail: every error collapses into `false`.
pub trait Prober {
    fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> bool;
}

/// Prober that opens (and immediately closes) a TCP connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProber;

impl Prober for TcpProber {
    #[instrument(skip_all, fields(endpoint = %endpoint, timeout_ms = timeout.as_millis() as u64))]
    fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let Some(addrs) = resolve(endpoint, deadline) else {
            return false;
        };

        for addr in addrs {
            let Some(budget) = remaining_budget(deadline) else {
                debug!("probe timed out");
                return false;
            };
            match TcpStream::connect_timeout(&addr, budget) {
                Ok(stream) => {
                    close(stream);
                    debug!(%addr, "endpoint reachable");
                    return true;
                }
                Err(err) => debug!(%addr, err = %err, "connect failed"),
            }
        }
        false
    }
}

/// Resolve the endpoint's host without overrunning `deadline`.
///
/// IP literals skip the resolver. Names are looked up on a helper thread; a
/// lookup that outlives the deadline is abandoned and finishes in the background.
fn resolve(endpoint: &Endpoint, deadline: Instant) -> Option<Vec<SocketAddr>> {
    let port = endpoint.port();
    if let Ok(ip) = endpoint.host().parse::<IpAddr>() {
        return Some(vec![SocketAddr::new(ip, port)]);
    }

    let host = endpoint.host().to_string();
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("readiness-resolve".to_string())
        .spawn(move || {
            let result = (host.as_str(), port)
                .to_socket_addrs()
                .map(|addrs| addrs.collect::<Vec<_>>());
            // Receiver is gone once the deadline passed.
            let _ = tx.send(result);
        });
    if let Err(err) = spawned {
        debug!(err = %err, "spawn resolver thread failed");
        return None;
    }

    let budget = remaining_budget(deadline)?;
    match rx.recv_timeout(budget) {
        Ok(Ok(addrs)) => Some(addrs),
        Ok(Err(err)) => {
            debug!(err = %err, "address resolution failed");
            None
        }
        Err(_) => {
            debug!("address resolution timed out");
            None
        }
    }
}

fn close(stream: TcpStream) {
    // Peer may already have gone away; dropping still releases the descriptor.
    let _ = stream.shutdown(Shutdown::Both);
}
