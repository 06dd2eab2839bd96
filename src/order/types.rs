//! Order Core Types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::state::{OrderStatus, OrderType};
use crate::core_types::{BalanceRecordId, OrderId, UserId};
use crate::error::SettleError;
use crate::slot::{Board, Evaluation, WinningLine};

/// Game-result payload attached to an order
///
/// Enough to reconstruct and re-evaluate the round after the fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    pub board: Board,
    pub lines: Vec<WinningLine>,
    pub total_win: Decimal,
    pub bet_amount: Decimal,
}

impl GameResult {
    pub fn new(board: Board, evaluation: Evaluation, bet_amount: Decimal) -> Self {
        Self {
            board,
            lines: evaluation.lines,
            total_win: evaluation.total_win,
            bet_amount,
        }
    }
}

/// Settlement request from the service layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleRequest {
    pub user_id: UserId,
    pub bet_amount: Decimal,
    /// Caller idempotency key, unique per user
    pub reference_id: Option<String>,
}

impl SettleRequest {
    pub fn new(user_id: UserId, bet_amount: Decimal) -> Self {
        Self {
            user_id,
            bet_amount,
            reference_id: None,
        }
    }

    pub fn with_reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }
}

/// One settled round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_no: String,
    pub user_id: UserId,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub bet_amount: Decimal,
    pub win_amount: Decimal,
    /// None for orders that failed before a board was drawn
    pub game_result: Option<GameResult>,
    pub balance_record_ids: Vec<BalanceRecordId>,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub remark: Option<String>,
}

impl Order {
    /// New slot order in PENDING
    pub fn pending(id: OrderId, order_no: String, user_id: UserId, bet_amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id,
            order_no,
            user_id,
            order_type: OrderType::SlotGame,
            status: OrderStatus::Pending,
            bet_amount,
            win_amount: Decimal::ZERO,
            game_result: None,
            balance_record_ids: Vec::new(),
            reference_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            remark: None,
        }
    }

    /// Move to `next`, enforcing the transition table
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), SettleError> {
        if !self.status.can_transition_to(next) {
            return Err(SettleError::InvalidStatusTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next == OrderStatus::Completed {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Net effect on the player's available balance
    pub fn net_amount(&self) -> Decimal {
        match self.status {
            OrderStatus::Completed => self.win_amount - self.bet_amount,
            _ => Decimal::ZERO,
        }
    }
}
