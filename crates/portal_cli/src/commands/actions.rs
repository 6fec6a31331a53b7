//! Actions command - List the quick-action menu for a role.

use anyhow::Result;
use clap::Args;

use portal_assistant::{QuickActionResponder, Role};

#[derive(Args)]
pub struct ActionsArgs {
    /// Role whose menu to show (student, parent, faculty, admin)
    #[arg(short, long)]
    role: Role,
}

pub fn execute(args: ActionsArgs) -> Result<()> {
    let actions = QuickActionResponder::new().actions_for(args.role);

    if actions.is_empty() {
        println!("No quick actions for {}.", args.role.display_name());
        return Ok(());
    }

    println!("Quick actions for {}:", args.role.display_name());
    for (index, action) in actions.iter().enumerate() {
        println!("  {}. {}", index + 1, action);
    }
    Ok(())
}
