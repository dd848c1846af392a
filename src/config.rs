use std::path::PathBuf;

/// How a freshly booked interview request enters the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookingPolicy {
    /// Bookings are accepted on creation and get a schedule immediately.
    #[default]
    AutoAccept,
    /// Bookings stay PENDING until the assigned interviewer responds.
    ManualApproval,
}

impl BookingPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "auto_accept" | "auto-accept" => Some(BookingPolicy::AutoAccept),
            "manual" | "manual_approval" | "manual-approval" => {
                Some(BookingPolicy::ManualApproval)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub policy: BookingPolicy,
    /// Replayed WAL records above which the log is rewritten as a snapshot.
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            policy: BookingPolicy::AutoAccept,
            compact_threshold: 1000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset or unparsable
    /// values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let data_dir = lookup("SLOTWISE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let policy = match lookup("SLOTWISE_BOOKING_POLICY") {
            Some(raw) => BookingPolicy::parse(&raw).unwrap_or_else(|| {
                tracing::warn!("unknown booking policy {raw:?}, using auto-accept");
                defaults.policy
            }),
            None => defaults.policy,
        };
        let compact_threshold = lookup("SLOTWISE_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.compact_threshold);
        Self {
            data_dir,
            policy,
            compact_threshold,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slotwise.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.policy, BookingPolicy::AutoAccept);
        assert_eq!(config.compact_threshold, 1000);
        assert_eq!(config.wal_path(), PathBuf::from("./data/slotwise.wal"));
    }

    #[test]
    fn reads_all_keys() {
        let config = Config::from_lookup(lookup_from(&[
            ("SLOTWISE_DATA_DIR", "/var/lib/slotwise"),
            ("SLOTWISE_BOOKING_POLICY", "manual"),
            ("SLOTWISE_COMPACT_THRESHOLD", "50"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/slotwise"));
        assert_eq!(config.policy, BookingPolicy::ManualApproval);
        assert_eq!(config.compact_threshold, 50);
    }

    #[test]
    fn bad_values_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("SLOTWISE_BOOKING_POLICY", "sometimes"),
            ("SLOTWISE_COMPACT_THRESHOLD", "lots"),
        ]));
        assert_eq!(config.policy, BookingPolicy::AutoAccept);
        assert_eq!(config.compact_threshold, 1000);
    }

    #[test]
    fn policy_parse_variants() {
        assert_eq!(BookingPolicy::parse("AUTO"), Some(BookingPolicy::AutoAccept));
        assert_eq!(
            BookingPolicy::parse(" manual-approval "),
            Some(BookingPolicy::ManualApproval)
        );
        assert_eq!(BookingPolicy::parse(""), None);
    }
}
