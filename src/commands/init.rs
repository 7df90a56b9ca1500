use anyhow::{Context, Result};
use serde_json::Map;
use tracing::info;

use crate::build::DCE_VERSION;
use crate::cli::InitArgs;
use crate::journal;
use crate::project;

pub fn run(args: InitArgs) -> Result<()> {
    let layout = project::init_project_dir(&args.project_dir).with_context(|| {
        format!(
            "could not initialise a project in {}",
            args.project_dir.display()
        )
    })?;

    let config = layout.read_config()?;
    journal::log_event(
        config.project_id,
        DCE_VERSION,
        "project_initialised",
        Map::new(),
    );

    info!(project_dir = %layout.project_dir.display(), "initialised project");
    println!(
        "Initialised project {} in {}",
        config.project_id,
        layout.project_dir.display()
    );
    println!("Drop datasource configs into src/databases and files into src/files, then run `dce build`.");

    Ok(())
}
