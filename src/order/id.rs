//! Order id generation
//!
//! Snowflake layout (63 bits, always positive as BIGINT):
//! `timestamp_ms since EPOCH (40 bits) | machine_id (8 bits) | sequence (15 bits)`
//!
//! The human-readable order number is `prefix + YYYYMMDD + 8-digit suffix`,
//! where the suffix is the low decimal digits of the snowflake id. The suffix
//! can collide, so the store enforces uniqueness of `order_no`.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Mutex;

use crate::core_types::OrderId;

/// 2024-01-01T00:00:00Z in unix millis
const EPOCH_MS: i64 = 1_704_067_200_000;
const SEQUENCE_BITS: u32 = 15;
const MACHINE_BITS: u32 = 8;
const SEQUENCE_MASK: u32 = (1 << SEQUENCE_BITS) - 1;

/// Digits of the numeric order-number suffix
pub const ORDER_NO_SUFFIX_DIGITS: u32 = 8;

struct SnowflakeState {
    sequence: u32,
    last_timestamp: i64,
}

/// Snowflake ID generator
pub struct SnowflakeGenerator {
    machine_id: u8,
    state: Mutex<SnowflakeState>,
}

impl SnowflakeGenerator {
    pub fn new(machine_id: u8) -> Self {
        Self {
            machine_id,
            state: Mutex::new(SnowflakeState {
                sequence: 0,
                last_timestamp: 0,
            }),
        }
    }

    pub fn generate(&self) -> OrderId {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut now = Self::now_ms();
        // Clock went backwards: keep issuing from the last timestamp
        if now < state.last_timestamp {
            now = state.last_timestamp;
        }

        if now == state.last_timestamp {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond, wait for the next one
                while now <= state.last_timestamp {
                    std::hint::spin_loop();
                    now = Self::now_ms();
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_timestamp = now;

        ((now - EPOCH_MS) << (MACHINE_BITS + SEQUENCE_BITS))
            | ((self.machine_id as i64) << SEQUENCE_BITS)
            | state.sequence as i64
    }

    /// Creation time encoded in an id
    pub fn timestamp_of(id: OrderId) -> Option<DateTime<Utc>> {
        let ms = (id >> (MACHINE_BITS + SEQUENCE_BITS)) + EPOCH_MS;
        Utc.timestamp_millis_opt(ms).single()
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Build `prefix + YYYYMMDD + suffix`
pub fn order_number(prefix: &str, date: DateTime<Utc>, id: OrderId) -> String {
    let modulus = 10i64.pow(ORDER_NO_SUFFIX_DIGITS);
    format!(
        "{}{}{:0width$}",
        prefix,
        date.format("%Y%m%d"),
        id.rem_euclid(modulus),
        width = ORDER_NO_SUFFIX_DIGITS as usize
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_positive_and_unique() {
        let generator = SnowflakeGenerator::new(3);
        let mut seen = HashSet::new();
        let mut last = 0;
        for _ in 0..50_000 {
            let id = generator.generate();
            assert!(id > 0);
            assert!(id > last, "ids must increase within one generator");
            assert!(seen.insert(id));
            last = id;
        }
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let generator = Arc::new(SnowflakeGenerator::new(1));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = generator.clone();
                std::thread::spawn(move || {
                    (0..5_000)
                        .map(|_| generator.generate())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 20_000);
    }

    #[test]
    fn test_machine_id_is_encoded() {
        let a = SnowflakeGenerator::new(1).generate();
        let b = SnowflakeGenerator::new(2).generate();
        assert_eq!((a >> SEQUENCE_BITS) & 0xFF, 1);
        assert_eq!((b >> SEQUENCE_BITS) & 0xFF, 2);
    }

    #[test]
    fn test_timestamp_of() {
        let before = Utc::now().timestamp_millis();
        let id = SnowflakeGenerator::new(1).generate();
        let ts = SnowflakeGenerator::timestamp_of(id).unwrap().timestamp_millis();
        assert!(ts >= before && ts - before < 5_000);
    }

    #[test]
    fn test_order_number_format() {
        let date = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        assert_eq!(order_number("SLOT", date, 1_234), "SLOT2026101900001234");
        assert_eq!(
            order_number("SL", date, 9_876_543_210_123),
            "SL2026101943210123"
        );
    }
}
