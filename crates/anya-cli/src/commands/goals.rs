//! Goal progress command

use anyhow::Result;
use anya_core::{db::Database, models::GoalStatus, money, GoalPlanner};
use chrono::Utc;

pub fn cmd_goal_primary(db: &Database, user_id: &str, goal_id: i64) -> Result<()> {
    let user = db.get_user(user_id)?;
    let goal = GoalPlanner::new(db).set_primary(&user, goal_id)?;
    println!("⭐ '{}' is now your primary goal", goal.name);
    Ok(())
}

pub fn cmd_goals(db: &Database, user_id: &str, all: bool) -> Result<()> {
    let user = db.get_user(user_id)?;
    let planner = GoalPlanner::new(db);
    let goals = if all {
        planner.all_progress(&user, Utc::now())?
    } else {
        planner.active_progress(&user, Utc::now())?
    };

    if goals.is_empty() {
        println!("No goals yet. Try: anya chat \"Save 60000 for a laptop in 6 months\"");
        return Ok(());
    }

    println!();
    for goal in goals {
        let icon = match goal.status {
            GoalStatus::Active if goal.on_track => "🎯",
            GoalStatus::Active => "⏳",
            GoalStatus::Achieved => "🏆",
            GoalStatus::Abandoned => "🗑️",
        };
        println!("{} {} ({})", icon, goal.name, goal.status);
        println!(
            "   {} of {} saved ({:.0}%)",
            money::format_amount(goal.saved_amount, &user.currency),
            money::format_amount(goal.target_amount, &user.currency),
            goal.percent
        );
        if goal.status == GoalStatus::Active {
            println!(
                "   Needs {}/month for {} month(s), deadline {}",
                money::format_amount(goal.required_monthly, &user.currency),
                goal.months_remaining,
                goal.deadline
            );
        }
        println!();
    }
    Ok(())
}
