//! Free-port discovery for local dev server instances.
//!
//! Binding a port and releasing it again is inherently racy: another process
//! may grab the port before the dev server binds it.

use rand::Rng;
use std::fmt;
use std::net::TcpListener;
use std::ops::RangeInclusive;
use tracing::debug;

/// Ports scanned by [`RandomPortPicker`] by default.
pub const RANDOM_PORT_RANGE: RangeInclusive<u16> = 32768..=60000;

/// Strategy for choosing a local port.
pub trait PortPicker: fmt::Debug + Send + Sync {
    /// Returns a port that was free at the time of the call, or `None`.
    fn pick_unused_port(&self) -> Option<u16>;
}

/// Check if a port is available by binding to it and dropping the listener.
pub fn is_port_available(port: u16) -> bool {
    match TcpListener::bind(("127.0.0.1", port)) {
        Ok(listener) => listener.local_addr().is_ok(),
        Err(_) => false,
    }
}

/// Scans a port range from a random starting point, wrapping around once.
#[derive(Debug, Clone)]
pub struct RandomPortPicker {
    range: RangeInclusive<u16>,
}

impl Default for RandomPortPicker {
    fn default() -> Self {
        Self::new(RANDOM_PORT_RANGE)
    }
}

impl RandomPortPicker {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self { range }
    }

    /// Candidate ports in scan order: `start..=end`, then `first..start`.
    fn scan_order(&self, start: u16) -> impl Iterator<Item = u16> {
        let (first, last) = (*self.range.start(), *self.range.end());
        (start..=last).chain(first..start)
    }
}

impl PortPicker for RandomPortPicker {
    fn pick_unused_port(&self) -> Option<u16> {
        if self.range.is_empty() {
            return None;
        }
        let start = rand::thread_rng().gen_range(self.range.clone());
        let port = self.scan_order(start).find(|&port| is_port_available(port));
        match port {
            Some(port) => debug!(port, start, "picked unused port"),
            None => debug!(
                first = *self.range.start(),
                last = *self.range.end(),
                "no unused port in range"
            ),
        }
        port
    }
}

/// Always returns the same answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedPortPicker(pub Option<u16>);

impl PortPicker for FixedPortPicker {
    fn pick_unused_port(&self) -> Option<u16> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_order_wraps_around() {
        let picker = RandomPortPicker::new(10..=14);
        let order: Vec<u16> = picker.scan_order(12).collect();
        assert_eq!(order, vec![12, 13, 14, 10, 11]);
    }

    #[test]
    fn scan_order_from_range_start_visits_every_port_once() {
        let picker = RandomPortPicker::new(10..=14);
        let order: Vec<u16> = picker.scan_order(10).collect();
        assert_eq!(order, vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn picked_port_is_in_range() {
        let picker = RandomPortPicker::default();
        let port = picker.pick_unused_port().expect("some port should be free");
        assert!(RANDOM_PORT_RANGE.contains(&port));
    }

    #[test]
    fn occupied_single_port_range_yields_none() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!is_port_available(port));

        let picker = RandomPortPicker::new(port..=port);
        assert_eq!(picker.pick_unused_port(), None);
    }

    #[test]
    fn fixed_picker_returns_its_value() {
        assert_eq!(FixedPortPicker(Some(42)).pick_unused_port(), Some(42));
        assert_eq!(FixedPortPicker(None).pick_unused_port(), None);
    }
}
