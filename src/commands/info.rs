use anyhow::Result;

use crate::build::DCE_VERSION;
use crate::cli::InfoArgs;
use crate::project::{self, paths};

pub fn run(args: InfoArgs) -> Result<()> {
    println!("dce {DCE_VERSION}");
    println!("project dir:  {}", args.project_dir.display());

    match project::validate_project_dir(&args.project_dir) {
        Some(layout) => {
            println!("config file:  {}", layout.config_file.display());
            match layout.read_config() {
                Ok(config) => {
                    println!("project id:   {}", config.project_id);
                    if let Some(model) = &config.embed_model {
                        println!("embed model:  {model}");
                    }
                    if let Some(dim) = config.embed_dim {
                        println!("embed dim:    {dim}");
                    }
                }
                Err(e) => println!("project id:   unreadable ({e})"),
            }
            println!("database:     {}", layout.db_path().display());
            println!("output dir:   {}", layout.output_dir().display());
        }
        None => println!("project:      not initialised (run `dce init`)"),
    }

    let state_dir = paths::state_dir();
    println!("state dir:    {}", state_dir.display());
    println!("journal:      {}", paths::journal_file(&state_dir).display());

    match crate::plugins::load_plugins(false) {
        Ok(registry) => {
            let types = registry
                .supported_types()
                .iter()
                .map(|t| t.full_type.clone())
                .collect::<Vec<String>>();
            println!("plugins:      {}", types.join(", "));
        }
        Err(e) => println!("plugins:      failed to load ({e})"),
    }

    Ok(())
}
