//! Budget management commands

use anyhow::{anyhow, Result};
use anya_core::{
    db::Database,
    models::{BudgetLevel, BudgetPeriod, BudgetScope, User},
    money, BudgetMonitor, EngineConfig,
};
use chrono::Utc;

fn parse_scope(scope: &str) -> Result<BudgetScope> {
    scope.parse().map_err(|e: String| anyhow!(e))
}

fn parse_period(period: &str) -> Result<BudgetPeriod> {
    period.parse().map_err(|e: String| anyhow!(e))
}

pub fn cmd_budget_list(db: &Database, config: &EngineConfig, user_id: &str) -> Result<()> {
    let user = db.get_user(user_id)?;
    let statuses = BudgetMonitor::new(db, config).all_statuses(&user, Utc::now())?;

    if statuses.is_empty() {
        println!("No budgets yet. Try: anya budget set --scope overall 5000");
        return Ok(());
    }

    println!();
    for status in statuses {
        let icon = match status.level {
            BudgetLevel::Ok => "🟢",
            BudgetLevel::Warning => "🟠",
            BudgetLevel::Over => "🔴",
        };
        let limit = status.limit.unwrap_or_default();
        println!(
            "{} {} {}: {} of {}",
            icon,
            status.period,
            status.scope.label(),
            money::format_amount(status.spent, &user.currency),
            money::format_amount(limit, &user.currency)
        );
        match status.overage() {
            Some(over) => println!("   Over by {}", money::format_amount(over, &user.currency)),
            None => println!(
                "   {} left",
                money::format_amount(status.remaining().unwrap_or_default(), &user.currency)
            ),
        }
    }
    println!();
    Ok(())
}

/// Parse the shared `scope period limit` arguments for a user that may not exist yet
fn budget_args(
    db: &Database,
    config: &EngineConfig,
    user_id: &str,
    scope: &str,
    period: &str,
    limit: &str,
) -> Result<(User, BudgetScope, BudgetPeriod, i64)> {
    let user = db.ensure_user(
        user_id,
        &config.default_currency,
        config.default_timezone.name(),
    )?;
    let scope = parse_scope(scope)?;
    let period = parse_period(period)?;
    let limit_amount = money::parse_minor(limit, &user.currency)
        .ok_or_else(|| anyhow!("Invalid limit: {}", limit))?;
    Ok((user, scope, period, limit_amount))
}

pub fn cmd_budget_add(
    db: &Database,
    config: &EngineConfig,
    user_id: &str,
    scope: &str,
    period: &str,
    limit: &str,
) -> Result<()> {
    let (user, scope, period, limit_amount) =
        budget_args(db, config, user_id, scope, period, limit)?;

    let budget = db.create_budget(&user.id, &scope, period, limit_amount)?;
    println!(
        "✅ Added {} {} budget of {}",
        budget.period,
        budget.scope.label(),
        money::format_amount(budget.limit_amount, &user.currency)
    );
    Ok(())
}

pub fn cmd_budget_set(
    db: &Database,
    config: &EngineConfig,
    user_id: &str,
    scope: &str,
    period: &str,
    limit: &str,
) -> Result<()> {
    let (user, scope, period, limit_amount) =
        budget_args(db, config, user_id, scope, period, limit)?;

    let budget = db.set_budget(&user.id, &scope, period, limit_amount)?;
    println!(
        "✅ {} {} budget set to {}",
        budget.period,
        budget.scope.label(),
        money::format_amount(budget.limit_amount, &user.currency)
    );
    Ok(())
}

pub fn cmd_budget_delete(db: &Database, user_id: &str, scope: &str, period: &str) -> Result<()> {
    let user = db.get_user(user_id)?;
    let scope = parse_scope(scope)?;
    let period = parse_period(period)?;

    db.delete_budget(&user.id, &scope, period)?;
    println!("🗑️  Deleted {} {} budget", period, scope.label());
    Ok(())
}
