use crate::app::App;
use crate::prompt::TerminalConfirm;
use anyhow::{bail, Context, Result};
use devplan_core::git::SystemGit;
use devplan_core::listing::{find_workspace, list_workspaces, remove_workspace};
use devplan_core::workspace::Confirm;

pub fn run(app: &App, dir: &str, yes: bool) -> Result<()> {
    let layout = app.layout()?;
    let git = SystemGit::locate()?;
    let workspaces = list_workspaces(&layout, &git)?;
    let Some(ws) = find_workspace(&workspaces, dir) else {
        bail!("no workspace matches '{dir}': see `devplan list`");
    };

    if ws.has_changes() && !yes {
        let prompt = format!("{} has uncommitted changes. Remove it anyway?", ws.id());
        if !TerminalConfirm.confirm(&prompt) {
            bail!("{} has uncommitted changes; pass --yes to remove it", ws.id());
        }
    }

    remove_workspace(&git, ws).with_context(|| format!("failed to remove {}", ws.path.display()))?;
    println!("Removed {}", ws.path.display());
    Ok(())
}
