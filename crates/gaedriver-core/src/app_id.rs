//! Application identifier parsing.
//!
//! A full application ID may carry a partition (`s~`) and a domain
//! (`example.com:`) in front of the bare ID: `s~example.com:my-app`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed application identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppId {
    /// The identifier exactly as configured.
    pub full: String,
    /// The bare ID without partition or domain.
    pub display: String,
    pub partition: String,
    pub domain: String,
}

impl AppId {
    pub fn parse(app_id: &str) -> Self {
        if app_id.is_empty() {
            return Self::default();
        }

        let mut partition = "";
        let mut display = app_id;
        if let Some((head, tail)) = display.split_once('~') {
            partition = head;
            display = tail;
        }

        let mut domain = "";
        if let Some((head, tail)) = display.split_once(':') {
            domain = head;
            display = tail;
        }

        Self {
            full: app_id.to_string(),
            display: display.to_string(),
            partition: partition.to_string(),
            domain: domain.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.full.is_empty()
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(input: &str, full: &str, display: &str, partition: &str, domain: &str) {
        let id = AppId::parse(input);
        assert_eq!(id.full, full, "full id for {input:?}");
        assert_eq!(id.display, display, "display id for {input:?}");
        assert_eq!(id.partition, partition, "partition for {input:?}");
        assert_eq!(id.domain, domain, "domain for {input:?}");
    }

    #[test]
    fn parse_app_ids() {
        check("", "", "", "", "");
        check("foo", "foo", "foo", "", "");
        check("s~foo", "s~foo", "foo", "s", "");
        check("a-domain.com:foo", "a-domain.com:foo", "foo", "", "a-domain.com");
        check("s~a-domain.com:foo", "s~a-domain.com:foo", "foo", "s", "a-domain.com");
    }

    #[test]
    fn display_prints_full_id() {
        assert_eq!(AppId::parse("s~foo").to_string(), "s~foo");
        assert!(AppId::parse("").is_empty());
    }
}
