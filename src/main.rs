//! Slot Settlement Engine
//!
//! Operator CLI around the settlement core:
//!
//! ```text
//! slot_settlement [--env dev] <command> [args]
//!
//!   init-schema                        create PostgreSQL tables
//!   create-user <opening_balance>      open an account
//!   deposit <user_id> <amount>         ADD to available balance
//!   settle <user_id> <bet> [reference] settle one round
//!   balance <user_id>                  show balances
//!   order <order_id>                   show and audit an order
//!   history <user_id>                  list balance records
//!   demo <rounds> <bet>                play rounds on a fresh account
//! ```
//!
//! Without a `postgres` section the in-memory store is used, which only makes
//! sense for `demo`.

use anyhow::{Context, Result, anyhow, bail};
use rust_decimal::Decimal;
use std::sync::Arc;

use slot_settlement::config::AppConfig;
use slot_settlement::db::Database;
use slot_settlement::ledger::{BalanceChange, BalanceKind, Ledger};
use slot_settlement::money::{format_amount, parse_amount};
use slot_settlement::order::{OrderEngine, SettleRequest};
use slot_settlement::store::{MemoryStore, PgSettlementStore, SettlementStore, schema};

fn get_env(args: &[String]) -> String {
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Positional arguments with `--env <name>` removed
fn positional(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip = false;
    for arg in args.iter().skip(1) {
        if skip {
            skip = false;
            continue;
        }
        if arg == "--env" || arg == "-e" {
            skip = true;
            continue;
        }
        out.push(arg.clone());
    }
    out
}

fn arg<'a>(args: &'a [String], i: usize, name: &str) -> Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing argument <{}>", name))
}

fn parse_id(s: &str) -> Result<i64> {
    s.parse().with_context(|| format!("invalid id: {}", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let env = get_env(&args);
    let app_config = AppConfig::load(&env)?;
    let _log_guard = slot_settlement::logging::init_logging(&app_config);

    tracing::info!(
        git_hash = env!("GIT_HASH"),
        "Starting slot settlement engine in {} mode",
        env
    );

    let table = Arc::new(app_config.symbol_table()?);
    let scale = app_config.engine.money_scale;

    let (store, pool) = match &app_config.postgres {
        Some(pg) => {
            let db = Database::connect_with(pg).await?;
            db.health_check().await?;
            let pool = db.pool().clone();
            let store: Arc<dyn SettlementStore> = Arc::new(PgSettlementStore::new(pool.clone()));
            (store, Some(pool))
        }
        None => {
            tracing::warn!("No postgres section configured, using in-memory store");
            let store: Arc<dyn SettlementStore> = Arc::new(MemoryStore::new());
            (store, None)
        }
    };

    let engine = OrderEngine::with_table(store.clone(), table, app_config.engine.clone())?;
    let cmd = positional(&args);

    match cmd.first().map(String::as_str) {
        Some("init-schema") => {
            let pool = pool.ok_or_else(|| anyhow!("init-schema requires a postgres section"))?;
            schema::init_schema(&pool).await?;
            println!("Schema initialized");
        }
        Some("create-user") => {
            let raw = arg(&cmd, 1, "opening_balance")?;
            // empty accounts are allowed
            let opening = if raw.trim() == "0" {
                Decimal::ZERO
            } else {
                parse_amount(raw, scale)?
            };
            let user = store.create_user(opening).await?;
            println!("Created user {} with {}", user.user_id(), format_amount(opening, scale));
        }
        Some("deposit") => {
            let user_id = parse_id(arg(&cmd, 1, "user_id")?)?;
            let amount = parse_amount(arg(&cmd, 2, "amount")?, scale)?;
            let change = BalanceChange::new(user_id, BalanceKind::Add, amount)
                .with_description("deposit")
                .with_operator(app_config.engine.operator.as_str());
            let (user, record) = Ledger::apply(store.as_ref(), &change).await?;
            println!(
                "Record {}: available {}",
                record.id,
                format_amount(user.available(), scale)
            );
        }
        Some("settle") => {
            let user_id = parse_id(arg(&cmd, 1, "user_id")?)?;
            let bet = parse_amount(arg(&cmd, 2, "bet")?, scale)?;
            let mut req = SettleRequest::new(user_id, bet);
            if let Some(reference) = cmd.get(3) {
                req = req.with_reference(reference.as_str());
            }
            match engine.settle(req).await {
                Ok(order) => println!("{}", serde_json::to_string_pretty(&order)?),
                Err(e) => bail!("[{}] {}", e.code(), e),
            }
        }
        Some("balance") => {
            let user_id = parse_id(arg(&cmd, 1, "user_id")?)?;
            let user = store
                .get_user(user_id)
                .await?
                .ok_or_else(|| anyhow!("user {} not found", user_id))?;
            println!(
                "User {}: available {}, frozen {}",
                user_id,
                format_amount(user.available(), scale),
                format_amount(user.frozen(), scale)
            );
        }
        Some("order") => {
            let order_id = parse_id(arg(&cmd, 1, "order_id")?)?;
            let order = engine
                .get_order(order_id)
                .await?
                .ok_or_else(|| anyhow!("order {} not found", order_id))?;
            println!("{}", serde_json::to_string_pretty(&order)?);
            let report = engine.audit_order(&order).await?;
            if report.is_clean() {
                println!("Audit: OK");
            } else {
                for issue in &report.issues {
                    println!("Audit: {}", issue);
                }
            }
        }
        Some("history") => {
            let user_id = parse_id(arg(&cmd, 1, "user_id")?)?;
            for r in store.user_balance_records(user_id).await? {
                println!(
                    "{:>8} {:<9} {:>12} available {} -> {} frozen {} -> {} {}",
                    r.id,
                    r.kind,
                    format_amount(r.amount, scale),
                    format_amount(r.before_available, scale),
                    format_amount(r.after_available, scale),
                    format_amount(r.before_frozen, scale),
                    format_amount(r.after_frozen, scale),
                    r.reference_id.as_deref().unwrap_or("-")
                );
            }
        }
        Some("demo") => {
            let rounds: u32 = arg(&cmd, 1, "rounds")?.parse().context("invalid rounds")?;
            let bet = parse_amount(arg(&cmd, 2, "bet")?, scale)?;
            run_demo(&engine, store.as_ref(), rounds, bet, scale).await?;
        }
        Some(other) => bail!("unknown command: {}", other),
        None => bail!("usage: slot_settlement [--env dev] <command> [args]"),
    }

    Ok(())
}

async fn run_demo(
    engine: &OrderEngine,
    store: &dyn SettlementStore,
    rounds: u32,
    bet: Decimal,
    scale: u32,
) -> Result<()> {
    let opening = bet * Decimal::from(rounds);
    let user = store.create_user(opening).await?;

    let mut wagered = Decimal::ZERO;
    let mut won = Decimal::ZERO;
    let mut hits = 0u32;
    for _ in 0..rounds {
        let order = match engine.settle_round(user.user_id(), bet).await {
            Ok(order) => order,
            Err(e) if e.is_business_rejection() => break,
            Err(e) => return Err(e.into()),
        };
        wagered += order.bet_amount;
        won += order.win_amount;
        if order.win_amount > Decimal::ZERO {
            hits += 1;
        }
    }

    let user = store
        .get_user(user.user_id())
        .await?
        .ok_or_else(|| anyhow!("demo user disappeared"))?;
    println!("Wagered:  {}", format_amount(wagered, scale));
    println!("Won:      {}", format_amount(won, scale));
    println!("Hits:     {}", hits);
    if wagered > Decimal::ZERO {
        println!("RTP:      {}%", (won / wagered * Decimal::from(100)).round_dp(2));
    }
    println!("Balance:  {}", format_amount(user.available(), scale));
    Ok(())
}
