use chrono::{DateTime, Timelike, Utc};
use std::fmt;
use tracing::info;

use crate::config::SessionConfig;

/// Which configured window(s) the current time falls into. Purely for
/// observability; gating only cares whether at least one window matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Closed,
    Open(String),
    Overlap,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Closed => write!(f, "Closed"),
            SessionStatus::Open(name) => write!(f, "{}", name),
            SessionStatus::Overlap => write!(f, "Overlap"),
        }
    }
}

/// Pure time-window gate plus an externally driven news-block flag.
///
/// Windows are half-open `[start_hour, end_hour)` in server-local hours;
/// overlapping windows collapse to "allowed". No side effects, recomputed
/// every call.
#[derive(Debug, Clone)]
pub struct SessionGate {
    config: SessionConfig,
    news_block: bool,
}

impl SessionGate {
    pub fn new(config: SessionConfig) -> Self {
        SessionGate {
            config,
            news_block: false,
        }
    }

    pub fn set_news_block(&mut self, active: bool) {
        if self.news_block != active {
            info!("SessionGate: news block set to {}", active);
        }
        self.news_block = active;
    }

    pub fn news_block_active(&self) -> bool {
        self.news_block
    }

    pub fn status(&self, now: DateTime<Utc>) -> SessionStatus {
        let hour = now.hour();
        let mut matches = self.config.windows.iter().filter(|w| w.contains(hour));
        match (matches.next(), matches.next()) {
            (None, _) => SessionStatus::Closed,
            (Some(window), None) => SessionStatus::Open(window.name.clone()),
            (Some(_), Some(_)) => SessionStatus::Overlap,
        }
    }

    pub fn in_session(&self, now: DateTime<Utc>) -> bool {
        self.status(now) != SessionStatus::Closed
    }

    pub fn is_trading_allowed(&self, now: DateTime<Utc>) -> bool {
        self.in_session(now) && !self.news_block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionWindow;
    use chrono::TimeZone;

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, hour, 30, 0).unwrap()
    }

    #[test]
    fn test_default_windows_half_open() {
        let gate = SessionGate::new(SessionConfig::default());
        assert!(!gate.is_trading_allowed(at_hour(7)));
        assert!(gate.is_trading_allowed(at_hour(8)));
        assert!(gate.is_trading_allowed(at_hour(11)));
        // End hour is exclusive.
        assert!(!gate.is_trading_allowed(at_hour(12)));
        assert!(gate.is_trading_allowed(at_hour(13)));
        assert!(!gate.is_trading_allowed(at_hour(17)));
    }

    #[test]
    fn test_status_names_and_overlap() {
        let config = SessionConfig {
            windows: vec![
                SessionWindow {
                    name: "London".to_string(),
                    start_hour: 8,
                    end_hour: 14,
                },
                SessionWindow {
                    name: "NewYork".to_string(),
                    start_hour: 13,
                    end_hour: 17,
                },
            ],
        };
        let gate = SessionGate::new(config);
        assert_eq!(gate.status(at_hour(9)), SessionStatus::Open("London".to_string()));
        assert_eq!(gate.status(at_hour(13)), SessionStatus::Overlap);
        assert!(gate.is_trading_allowed(at_hour(13)));
        assert_eq!(gate.status(at_hour(20)), SessionStatus::Closed);
    }

    #[test]
    fn test_news_block_overrides_open_session() {
        let mut gate = SessionGate::new(SessionConfig::default());
        assert!(gate.is_trading_allowed(at_hour(9)));
        gate.set_news_block(true);
        assert!(!gate.is_trading_allowed(at_hour(9)));
        assert!(gate.in_session(at_hour(9)));
        gate.set_news_block(false);
        assert!(gate.is_trading_allowed(at_hour(9)));
    }
}
