use crate::app::App;
use crate::output::{print_json, print_table};
use anyhow::Result;
use devplan_core::git::SystemGit;
use devplan_core::listing::{list_workspaces, ClonedWorkspace};
use devplan_core::recent_activity::sort_by_activity;

pub fn run(app: &App, json: bool) -> Result<()> {
    let layout = app.layout()?;
    let git = SystemGit::locate()?;
    let mut workspaces = list_workspaces(&layout, &git)?;
    sort_by_activity(&mut workspaces, &app.activity_store());

    if json {
        return print_json(&workspaces);
    }
    if workspaces.is_empty() {
        println!("No workspaces in {}", layout.root().display());
        return Ok(());
    }
    let rows = workspaces.iter().map(row).collect();
    print_table(&["", "WORKSPACE", "TITLE", "REPOS", "PATH"], rows);
    Ok(())
}

fn row(ws: &ClonedWorkspace) -> Vec<String> {
    let repos: Vec<&str> = ws
        .repos
        .iter()
        .filter_map(|r| r.full_name.as_deref())
        .collect();
    vec![
        if ws.has_changes() { "*" } else { "" }.to_string(),
        ws.id(),
        ws.title().to_string(),
        repos.join(", "),
        ws.path.display().to_string(),
    ]
}
