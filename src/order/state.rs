//! Order FSM State Definitions
//!
//! ```text
//! PENDING → COMPLETED
//!         → CANCELLED
//!         → FAILED
//! ```
//!
//! State IDs are stored as SMALLINT in `slot_orders_tb.status`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order lifecycle status
///
/// Terminal states: COMPLETED (10), CANCELLED (-10), FAILED (-20)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum OrderStatus {
    /// Created inside the settlement transaction, never visible after commit
    Pending = 0,

    /// Terminal: bet deducted, win credited
    Completed = 10,

    /// Terminal: withdrawn before settlement
    Cancelled = -10,

    /// Terminal: rejected by a business rule, no balance change
    Failed = -20,
}

impl OrderStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Failed
        )
    }

    /// The fixed transition table
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (
                OrderStatus::Pending,
                OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Failed
            )
        )
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(OrderStatus::Pending),
            10 => Some(OrderStatus::Completed),
            -10 => Some(OrderStatus::Cancelled),
            -20 => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for OrderStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        OrderStatus::from_id(value).ok_or(())
    }
}

/// Order type
///
/// Only slot rounds are settled by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum OrderType {
    SlotGame = 1,
}

impl OrderType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(OrderType::SlotGame),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::SlotGame => "SLOT_GAME",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Failed,
    ];

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
    }

    #[test]
    fn test_transition_table() {
        for next in ALL {
            let allowed = next != OrderStatus::Pending;
            assert_eq!(OrderStatus::Pending.can_transition_to(next), allowed);
        }
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for next in ALL {
                assert!(!from.can_transition_to(next), "{} -> {}", from, next);
            }
        }
    }

    #[test]
    fn test_state_id_roundtrip() {
        for state in ALL {
            assert_eq!(OrderStatus::from_id(state.id()), Some(state));
        }
        assert!(OrderStatus::from_id(99).is_none());
        assert!(OrderStatus::try_from(-30).is_err());
    }

    #[test]
    fn test_order_type() {
        assert_eq!(OrderType::from_id(1), Some(OrderType::SlotGame));
        assert_eq!(OrderType::from_id(2), None);
        assert_eq!(OrderType::SlotGame.to_string(), "SLOT_GAME");
    }
}
