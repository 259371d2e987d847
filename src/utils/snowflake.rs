use std::sync::Mutex;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const EPOCH: u64 = 1_672_531_200_000u64;
const COUNTER_BITS: u64 = 12;
const NODE_BITS: u64 = 10;
const COUNTER_MASK: u64 = (1 << COUNTER_BITS) - 1;
const NODE_MASK: u64 = (1 << NODE_BITS) - 1;

#[derive(Debug, Default)]
struct GeneratorState {
    last_ts: u64,
    counter: u64,
}

impl GeneratorState {
    /// Advance to a (ts, counter) pair for the given clock reading, or
    /// None when the caller has to wait for the next millisecond: the
    /// clock ran backwards or the counter overflowed inside this one.
    fn advance(&mut self, now: u64) -> Option<(u64, u64)> {
        if now < self.last_ts {
            return None;
        }
        if now == self.last_ts {
            if self.counter >= COUNTER_MASK {
                return None;
            }
            self.counter += 1;
        } else {
            self.last_ts = now;
            self.counter = 0;
        }
        Some((self.last_ts, self.counter))
    }
}

/// Time-ordered id generator: 41 bits of milliseconds since `EPOCH`,
/// 10 bits of node id, 12 bits of per-millisecond counter. Fits in a
/// positive i64, so ids sort by creation time.
#[derive(Debug)]
pub struct SnowflakeGenerator {
    state: Mutex<GeneratorState>,
    node_id: u16,
}

impl SnowflakeGenerator {
    pub fn new(node_id: u16) -> Self {
        assert!(
            (node_id as u64) <= NODE_MASK,
            "node_id {} exceeds max {}",
            node_id,
            NODE_MASK
        );

        Self {
            state: Mutex::new(GeneratorState::default()),
            node_id,
        }
    }

    fn millis_since_epoch() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_millis() as u64
    }

    pub fn generate(&self) -> i64 {
        let (ts, counter) = loop {
            let now = Self::millis_since_epoch().saturating_sub(EPOCH);
            if let Some(pair) = self.state.lock().unwrap().advance(now) {
                break pair;
            }
            // wait out the millisecond without holding the lock
            thread::sleep(Duration::from_millis(1));
        };

        let id = (ts << (COUNTER_BITS + NODE_BITS))
            | (((self.node_id as u64) & NODE_MASK) << COUNTER_BITS)
            | (counter & COUNTER_MASK);
        id as i64
    }

    /// Split an id back into (unix seconds, node id, counter).
    pub fn parse(id: i64) -> (f64, u16, u16) {
        let id = id as u64;
        let ts = (id >> (COUNTER_BITS + NODE_BITS)) + EPOCH;
        let node = ((id >> COUNTER_BITS) & NODE_MASK) as u16;
        let counter = (id & COUNTER_MASK) as u16;
        (ts as f64 / 1000.0, node, counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let generator = SnowflakeGenerator::new(3);
        let mut prev = 0;
        for _ in 0..5000 {
            let id = generator.generate();
            assert!(id > prev);
            prev = id;
        }
    }

    #[test]
    fn parse_recovers_node() {
        let generator = SnowflakeGenerator::new(511);
        let id = generator.generate();
        let (secs, node, _) = SnowflakeGenerator::parse(id);
        assert_eq!(node, 511);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();
        assert!((now - secs).abs() < 5.0);
    }

    #[test]
    fn counter_overflow_waits_for_next_tick() {
        let mut st = GeneratorState {
            last_ts: 100,
            counter: COUNTER_MASK,
        };
        assert_eq!(st.advance(100), None);
        assert_eq!(st.advance(101), Some((101, 0)));
    }

    #[test]
    fn backwards_clock_refused() {
        let mut st = GeneratorState {
            last_ts: 100,
            counter: 0,
        };
        assert_eq!(st.advance(99), None);
    }

    #[test]
    #[should_panic]
    fn node_id_out_of_range() {
        SnowflakeGenerator::new(1024);
    }
}
