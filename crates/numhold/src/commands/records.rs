//! One-shot record operations.

use anyhow::{bail, Result};
use chrono::Duration;
use clap::ArgMatches;
use numhold_core::{OperatorId, TransitionEngine};

use crate::{cli::status_filter, output::Outcome};

fn number(matches: &ArgMatches) -> Result<&str> {
    matches
        .get_one::<String>("number")
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("NUMBER is required"))
}

fn owner(matches: &ArgMatches) -> Option<OperatorId> {
    matches.get_one::<String>("owner").map(OperatorId::new)
}

pub async fn run(
    engine: &TransitionEngine,
    operator: &OperatorId,
    command: &str,
    matches: &ArgMatches,
) -> Result<Outcome> {
    match command {
        "enqueue" => {
            let number = number(matches)?;
            let id = engine.enqueue(operator, number).await?;
            Ok(Outcome::Enqueued {
                id,
                number: number.trim().to_string(),
            })
        }
        "hold" => {
            let minutes = matches
                .get_one::<u64>("minutes")
                .map(|m| i64::try_from(*m).map(Duration::minutes))
                .transpose()?;
            let receipt = engine.take_hold(number(matches)?, minutes, operator).await?;
            Ok(Outcome::Held {
                record: receipt.record,
            })
        }
        "success" => Ok(Outcome::Resolved {
            resolution: engine.mark_success(number(matches)?).await?,
        }),
        "fail" => Ok(Outcome::Resolved {
            resolution: engine.mark_failed(number(matches)?).await?,
        }),
        "remove" => {
            let number = number(matches)?;
            engine.remove(number).await?;
            Ok(Outcome::Removed {
                number: number.trim().to_string(),
            })
        }
        "find" => Ok(Outcome::Found {
            record: engine.find_by_number(number(matches)?).await?,
        }),
        "list" => list(engine, matches).await,
        "count" => {
            let count = engine
                .count_records(owner(matches).as_ref(), status_filter(matches)?)
                .await?;
            Ok(Outcome::Counted { count })
        }
        "clear" => Ok(Outcome::Cleared {
            removed: engine.clear_all().await?,
        }),
        other => bail!("Unknown command '{other}'. Run 'numhold --help' for usage."),
    }
}

async fn list(engine: &TransitionEngine, matches: &ArgMatches) -> Result<Outcome> {
    let status = status_filter(matches)?;
    if let Some(owner) = owner(matches) {
        let records = engine.list_by_owner(&owner, status).await?;
        return Ok(Outcome::Owned { records });
    }

    let page = matches.get_one::<u32>("page").copied().unwrap_or(1);
    let page_size = matches.get_one::<u32>("page-size").copied().unwrap_or(20);
    let page = match status {
        Some(status) => engine.query_by_status(status, page, page_size).await?,
        None => engine.query_all(page, page_size).await?,
    };
    Ok(Outcome::Listed { page })
}
