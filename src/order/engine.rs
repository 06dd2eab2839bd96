//! Order Engine
//!
//! Drives one slot round end to end inside a single store transaction:
//!
//! ```text
//! DEDUCT bet → fill board → evaluate → ADD win (if any)
//!            → insert PENDING order → COMPLETED → commit
//! ```
//!
//! Any error before commit rolls the whole round back. Transaction conflicts
//! (including order number collisions) retry the round from scratch.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::id::{SnowflakeGenerator, order_number};
use super::state::{OrderStatus, OrderType};
use super::types::{GameResult, Order, SettleRequest};
use crate::config::EngineConfig;
use crate::core_types::{OrderId, UserId};
use crate::error::SettleError;
use crate::ledger::{BalanceChange, BalanceKind, BalanceRecord, Ledger};
use crate::money::{fits_storage, validate_amount};
use crate::slot::{Board, PaytableError, SymbolDraw, SymbolTable, WeightedDrawer, WinEvaluator};
use crate::store::{SettlementStore, StoreError, StoreTx};

/// Pre-insert validation of an order
pub fn before_order_create(order: &Order) -> Result<(), SettleError> {
    match order.order_type {
        OrderType::SlotGame => {}
    }
    if order.status != OrderStatus::Pending {
        return Err(SettleError::InvalidOrder(format!(
            "new order must be PENDING, got {}",
            order.status
        )));
    }
    if order.order_no.is_empty() {
        return Err(SettleError::InvalidOrder("order number is empty".into()));
    }
    if order.bet_amount <= Decimal::ZERO {
        return Err(SettleError::InvalidOrder("bet amount must be positive".into()));
    }
    if order.win_amount < Decimal::ZERO {
        return Err(SettleError::InvalidOrder("win amount is negative".into()));
    }
    if !fits_storage(order.bet_amount) || !fits_storage(order.win_amount) {
        return Err(SettleError::InvalidOrder(
            "order amounts do not fit NUMERIC(30,8)".into(),
        ));
    }
    if let Some(result) = &order.game_result
        && (result.total_win != order.win_amount || result.bet_amount != order.bet_amount)
    {
        return Err(SettleError::InvalidOrder(
            "game result does not match order amounts".into(),
        ));
    }
    Ok(())
}

/// Outcome of re-checking a stored order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    pub order_id: OrderId,
    pub stored_win: Decimal,
    /// None when the order carries no game result
    pub recomputed_win: Option<Decimal>,
    /// Net available change across the linked balance records
    pub record_net: Decimal,
    pub expected_net: Decimal,
    pub issues: Vec<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

pub struct OrderEngine {
    store: Arc<dyn SettlementStore>,
    drawer: Arc<dyn SymbolDraw>,
    evaluator: WinEvaluator,
    id_gen: SnowflakeGenerator,
    config: EngineConfig,
}

impl OrderEngine {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        drawer: Arc<dyn SymbolDraw>,
        evaluator: WinEvaluator,
        config: EngineConfig,
    ) -> Self {
        let id_gen = SnowflakeGenerator::new(config.machine_id);
        Self {
            store,
            drawer,
            evaluator,
            id_gen,
            config,
        }
    }

    /// Production wiring: weighted `OsRng` drawer over `table`
    pub fn with_table(
        store: Arc<dyn SettlementStore>,
        table: Arc<SymbolTable>,
        config: EngineConfig,
    ) -> Result<Self, PaytableError> {
        table.check_money_scale(config.money_scale)?;
        let drawer = Arc::new(WeightedDrawer::new(table.clone())?);
        let evaluator = WinEvaluator::new(table, config.scatter_rule());
        Ok(Self::new(store, drawer, evaluator, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &WinEvaluator {
        &self.evaluator
    }

    /// Settle one round for `user_id`
    pub async fn settle_round(
        &self,
        user_id: UserId,
        bet_amount: Decimal,
    ) -> Result<Order, SettleError> {
        self.settle(SettleRequest::new(user_id, bet_amount)).await
    }

    /// Settle one round, at most once per `(user_id, reference_id)`
    pub async fn settle(&self, req: SettleRequest) -> Result<Order, SettleError> {
        self.validate(&req)?;

        let max_attempts = self.config.max_conflict_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;

            if let Some(existing) = self.existing_order(&req).await? {
                info!(
                    order_no = %existing.order_no,
                    user_id = req.user_id,
                    "Returning existing order for reference"
                );
                return Ok(existing);
            }

            match self.attempt(&req).await {
                Ok(order) => return Ok(order),
                Err(SettleError::TransactionConflict) if attempt < max_attempts => {
                    warn!(user_id = req.user_id, attempt, "Settlement conflict, retrying");
                }
                Err(SettleError::TransactionConflict) => {
                    error!(user_id = req.user_id, attempt, "Settlement conflict, giving up");
                    return Err(SettleError::TransactionConflict);
                }
                Err(e) if e.is_business_rejection() => {
                    info!(user_id = req.user_id, error = %e, "Round rejected");
                    if self.config.persist_failed_orders {
                        self.record_failed(&req, &e).await;
                    }
                    return Err(e);
                }
                Err(e) => {
                    if !e.is_validation() {
                        error!(user_id = req.user_id, error = %e, "Settlement failed");
                    }
                    return Err(e);
                }
            }
        }
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, SettleError> {
        Ok(self.store.get_order(order_id).await?)
    }

    pub async fn find_by_reference(
        &self,
        user_id: UserId,
        reference_id: &str,
    ) -> Result<Option<Order>, SettleError> {
        Ok(self.store.find_order_by_reference(user_id, reference_id).await?)
    }

    /// Re-derive the win from the stored board and check the balance trail.
    ///
    /// Uses the engine's current paytable and scatter rule.
    pub async fn audit_order(&self, order: &Order) -> Result<AuditReport, SettleError> {
        let mut issues = Vec::new();

        let recomputed_win = match &order.game_result {
            Some(result) => {
                let evaluation = self.evaluator.evaluate(&result.board, order.bet_amount)?;
                if evaluation.total_win != order.win_amount {
                    issues.push(format!(
                        "win mismatch: stored {}, recomputed {}",
                        order.win_amount, evaluation.total_win
                    ));
                }
                if evaluation.lines != result.lines {
                    issues.push("winning lines differ from stored result".to_string());
                }
                Some(evaluation.total_win)
            }
            None => {
                if order.status == OrderStatus::Completed {
                    issues.push("completed order has no game result".to_string());
                }
                None
            }
        };

        let records = self.store.balance_records(&order.balance_record_ids).await?;
        if records.len() != order.balance_record_ids.len() {
            issues.push(format!(
                "expected {} balance records, found {}",
                order.balance_record_ids.len(),
                records.len()
            ));
        }
        for record in &records {
            if record.user_id != order.user_id {
                issues.push(format!("record {} belongs to user {}", record.id, record.user_id));
            }
            if !record.is_consistent() {
                issues.push(format!("record {} before/after mismatch", record.id));
            }
        }

        let record_net: Decimal = records.iter().map(BalanceRecord::available_delta).sum();
        let expected_net = order.net_amount();
        if record_net != expected_net {
            issues.push(format!(
                "net change {} differs from win - bet {}",
                record_net, expected_net
            ));
        }

        Ok(AuditReport {
            order_id: order.id,
            stored_win: order.win_amount,
            recomputed_win,
            record_net,
            expected_net,
            issues,
        })
    }

    fn validate(&self, req: &SettleRequest) -> Result<(), SettleError> {
        if req.user_id <= 0 {
            return Err(SettleError::Validation(format!("invalid user id {}", req.user_id)));
        }
        validate_amount(req.bet_amount, self.config.money_scale)?;
        if let Some(reference) = &req.reference_id
            && (reference.trim().is_empty() || reference.len() > 64)
        {
            return Err(SettleError::Validation(
                "reference id must be 1-64 characters".into(),
            ));
        }
        Ok(())
    }

    async fn existing_order(&self, req: &SettleRequest) -> Result<Option<Order>, SettleError> {
        let Some(reference) = &req.reference_id else {
            return Ok(None);
        };
        let Some(order) = self.find_by_reference(req.user_id, reference).await? else {
            return Ok(None);
        };
        if order.bet_amount != req.bet_amount {
            return Err(SettleError::Validation(format!(
                "reference {} already used for bet {}",
                reference, order.bet_amount
            )));
        }
        Ok(Some(order))
    }

    /// One attempt, bounded by the configured timeout.
    /// On timeout the in-flight transaction is dropped, which rolls it back.
    async fn attempt(&self, req: &SettleRequest) -> Result<Order, SettleError> {
        if self.config.settle_timeout_ms == 0 {
            return self.settle_once(req).await;
        }
        let limit = Duration::from_millis(self.config.settle_timeout_ms);
        match tokio::time::timeout(limit, self.settle_once(req)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    user_id = req.user_id,
                    timeout_ms = self.config.settle_timeout_ms,
                    "Settlement timed out"
                );
                Err(SettleError::Timeout)
            }
        }
    }

    async fn settle_once(&self, req: &SettleRequest) -> Result<Order, SettleError> {
        let mut tx = self.store.begin().await?;

        let order = match self.run_round(tx.as_mut(), req).await {
            Ok(order) => order,
            Err(e) => {
                rollback(tx).await;
                return Err(e);
            }
        };

        tx.commit().await.map_err(duplicate_as_conflict)?;

        info!(
            order_no = %order.order_no,
            user_id = order.user_id,
            bet = %order.bet_amount,
            win = %order.win_amount,
            "Round settled"
        );
        Ok(order)
    }

    async fn run_round(
        &self,
        tx: &mut dyn StoreTx,
        req: &SettleRequest,
    ) -> Result<Order, SettleError> {
        let id = self.id_gen.generate();
        let order_no = order_number(&self.config.order_prefix, Utc::now(), id);

        let deduct = BalanceChange::new(req.user_id, BalanceKind::Deduct, req.bet_amount)
            .with_description("slot bet")
            .with_operator(self.config.operator.as_str())
            .with_reference(order_no.as_str())
            .with_remark(json!({ "order_id": id }));
        let (_, bet_record) = Ledger::process_balance_change(tx, &deduct).await?;

        let board = Board::fill(self.drawer.as_ref());
        let evaluation = self.evaluator.evaluate(&board, req.bet_amount)?;
        let win_amount = evaluation.total_win;
        debug!(
            order_no = %order_no,
            lines = evaluation.lines.len(),
            win = %win_amount,
            "Board evaluated"
        );

        let mut record_ids = vec![bet_record.id];
        if win_amount > Decimal::ZERO {
            let credit = BalanceChange::new(req.user_id, BalanceKind::Add, win_amount)
                .with_description("slot win")
                .with_operator(self.config.operator.as_str())
                .with_reference(order_no.as_str())
                .with_remark(json!({ "order_id": id, "lines": evaluation.lines.len() }));
            let (_, win_record) = Ledger::process_balance_change(tx, &credit).await?;
            record_ids.push(win_record.id);
        }

        let mut order = Order::pending(id, order_no, req.user_id, req.bet_amount);
        order.win_amount = win_amount;
        order.game_result = Some(GameResult::new(board, evaluation, req.bet_amount));
        order.balance_record_ids = record_ids;
        order.reference_id = req.reference_id.clone();

        before_order_create(&order)?;
        tx.insert_order(&order).await.map_err(duplicate_as_conflict)?;

        order.transition(OrderStatus::Completed)?;
        tx.update_order(&order).await?;
        Ok(order)
    }

    /// Persist a FAILED order with no balance effect. Best effort: the
    /// rejection is returned to the caller either way.
    async fn record_failed(&self, req: &SettleRequest, cause: &SettleError) {
        match self.insert_failed(req, cause).await {
            Ok(order) => info!(
                order_no = %order.order_no,
                user_id = req.user_id,
                "Recorded failed order"
            ),
            Err(e) => error!(user_id = req.user_id, error = %e, "Failed to record failed order"),
        }
    }

    async fn insert_failed(
        &self,
        req: &SettleRequest,
        cause: &SettleError,
    ) -> Result<Order, SettleError> {
        let id = self.id_gen.generate();
        let order_no = order_number(&self.config.order_prefix, Utc::now(), id);
        let mut order = Order::pending(id, order_no, req.user_id, req.bet_amount);
        order.reference_id = req.reference_id.clone();
        order.remark = Some(format!("{}: {}", cause.code(), cause));
        before_order_create(&order)?;

        let mut tx = self.store.begin().await?;
        let written = async {
            tx.insert_order(&order).await?;
            order.transition(OrderStatus::Failed)?;
            tx.update_order(&order).await?;
            Ok::<_, SettleError>(())
        }
        .await;
        if let Err(e) = written {
            rollback(tx).await;
            return Err(e);
        }
        tx.commit().await?;
        Ok(order)
    }
}

/// Unique violations on orders mean a concurrent twin or an order number
/// collision. Both resolve by retrying.
fn duplicate_as_conflict(e: StoreError) -> SettleError {
    match e {
        StoreError::DuplicateKey(key) => {
            debug!(constraint = %key, "Unique violation, treating as conflict");
            SettleError::TransactionConflict
        }
        other => other.into(),
    }
}

async fn rollback(tx: Box<dyn StoreTx>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Rollback failed");
    }
}
