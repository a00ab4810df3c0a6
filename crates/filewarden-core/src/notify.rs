use std::net::UdpSocket;
use tracing::{debug, warn};

/// One-way signal sent after a pass that found drift.
///
/// Delivery is best-effort: failures are logged and never retried, the next
/// pass recomputes the true state anyway.
pub trait ChangeNotifier: Send + Sync {
    fn notify(&self, drifted: usize);
}

/// Sends the drift count as ASCII decimal in a single UDP datagram.
pub struct UdpNotifier {
    addr: String,
}

impl UdpNotifier {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl ChangeNotifier for UdpNotifier {
    fn notify(&self, drifted: usize) {
        let payload = drifted.to_string();
        let sent = UdpSocket::bind("0.0.0.0:0").and_then(|socket| socket.send_to(payload.as_bytes(), &self.addr));
        match sent {
            Ok(_) => debug!("Sent change notification ({}) to {}", drifted, self.addr),
            Err(e) => warn!("Change notification to {} failed: {}", self.addr, e),
        }
    }
}

impl<T: ChangeNotifier + ?Sized> ChangeNotifier for Box<T> {
    fn notify(&self, drifted: usize) {
        (**self).notify(drifted)
    }
}

pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn notify(&self, _drifted: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_udp_payload_is_decimal_count() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let addr = receiver.local_addr().unwrap();

        UdpNotifier::new(addr.to_string()).notify(3);

        let mut buf = [0u8; 32];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"3");
    }

    #[test]
    fn test_unreachable_address_does_not_panic() {
        UdpNotifier::new("not an address").notify(1);
    }
}
