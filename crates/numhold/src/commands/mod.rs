//! Subcommand dispatch.

pub mod records;
pub mod serve;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use numhold_core::{
    load_settings, HoldConfig, OperatorId, Settings, SqliteRecordStore, TransitionEngine,
};

use crate::{cli::setup::resolve_operator, output::Outcome};

/// Load settings and run the chosen subcommand.
pub async fn execute(matches: &ArgMatches) -> Result<Outcome> {
    let Some((name, sub)) = matches.subcommand() else {
        bail!("Unknown command. Run 'numhold --help' for usage.");
    };

    let config = sub.get_one::<String>("config").map(Path::new);
    let mut settings = load_settings(config).await?;
    if let Some(db) = sub.get_one::<String>("db") {
        settings.database_path = PathBuf::from(db);
    }

    if name == "serve" {
        serve::apply_overrides(&mut settings, sub);
        settings.validate()?;
        return serve::run(settings, config).await;
    }

    let operator = OperatorId::new(resolve_operator(
        sub.get_one::<String>("operator").map(String::as_str),
    ));
    let engine = open_engine(&settings).await?;
    records::run(&engine, &operator, name, sub).await
}

/// Open the configured database and build an engine over it.
pub async fn open_engine(settings: &Settings) -> Result<TransitionEngine> {
    let store = SqliteRecordStore::open(&settings.database_path, settings.max_connections)
        .await
        .with_context(|| {
            format!(
                "Failed to open database {}",
                settings.database_path.display()
            )
        })?;
    let config = HoldConfig::with_default(settings.default_hold())?;
    Ok(
        TransitionEngine::new(Arc::new(store), Arc::new(config))
            .with_store_timeout(settings.store_timeout()),
    )
}
