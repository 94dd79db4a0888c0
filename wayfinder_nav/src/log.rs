// Rate limiting for repeated failure logs.
//
// A stuck agent can fail the same way every tick for minutes. `LogThrottle`
// remembers, per (agent, key), when a message last went out and only lets the
// next one through after the configured interval. Callers wrap their
// `tracing::warn!`/`debug!` in `if throttle.allow(..)`.

use crate::types::AgentId;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct LogThrottle {
    interval_ms: u64,
    last: Mutex<FxHashMap<(AgentId, &'static str), u64>>,
}

impl LogThrottle {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last: Mutex::new(FxHashMap::default()),
        }
    }

    /// Returns `true` (and records `now_ms`) if a message for this agent and
    /// key may be emitted.
    pub fn allow(&self, agent: AgentId, key: &'static str, now_ms: u64) -> bool {
        let mut last = self.last.lock();
        match last.get(&(agent, key)) {
            Some(&at) if now_ms.saturating_sub(at) < self.interval_ms => false,
            _ => {
                last.insert((agent, key), now_ms);
                true
            }
        }
    }

    /// Drop all entries for an agent.
    pub fn forget(&self, agent: AgentId) {
        self.last.lock().retain(|(a, _), _| *a != agent);
    }
}
