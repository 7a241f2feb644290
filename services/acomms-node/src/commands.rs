//! Operator command lines read from stdin
//!
//! ```text
//! range lauv-1            range through every active relay
//! abort lauv-1@manta-1    abort through one named relay
//! msg lauv-1 hello there  send text as a message
//! start-plan lauv-1 survey
//! resume lauv-1 survey goto3
//! reverse-range lauv-1
//! cancel 4
//! refresh | systems | ranges | clear-ranges | ops
//! ```

use acomms_c2_router::{CommandPayload, GatewaySelector, OperationId};
use anyhow::{anyhow, bail, Result};

/// Parsed operator input
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Submit {
        target: String,
        via: Option<GatewaySelector>,
        command: CommandPayload,
    },
    Cancel(OperationId),
    Refresh,
    Systems,
    Ranges,
    ClearRanges,
    Operations,
}

pub fn parse(line: &str) -> Result<OperatorCommand> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or_else(|| anyhow!("empty command"))?;

    let simple = match verb {
        "refresh" => Some(OperatorCommand::Refresh),
        "systems" => Some(OperatorCommand::Systems),
        "ranges" => Some(OperatorCommand::Ranges),
        "clear-ranges" => Some(OperatorCommand::ClearRanges),
        "ops" => Some(OperatorCommand::Operations),
        _ => None,
    };
    if let Some(command) = simple {
        return Ok(command);
    }

    if verb == "cancel" {
        let id = words
            .next()
            .ok_or_else(|| anyhow!("usage: cancel <operation>"))?
            .trim_start_matches("op-")
            .parse::<u64>()?;
        return Ok(OperatorCommand::Cancel(OperationId(id)));
    }

    let addressed = words
        .next()
        .ok_or_else(|| anyhow!("usage: {verb} <target>[@<gateway>] ..."))?;
    let (target, via) = match addressed.split_once('@') {
        Some((target, gateway)) if !gateway.is_empty() => {
            (target, Some(GatewaySelector::specific(gateway)))
        }
        _ => (addressed, None),
    };
    if target.is_empty() {
        bail!("missing target");
    }

    let rest: Vec<&str> = words.collect();
    let command = match verb {
        "range" => CommandPayload::Range,
        "reverse-range" => CommandPayload::ReverseRange,
        "abort" => CommandPayload::Abort,
        "msg" => {
            if rest.is_empty() {
                bail!("usage: msg <target> <text>");
            }
            CommandPayload::Message(rest.join(" ").into_bytes())
        }
        "start-plan" => match rest.as_slice() {
            [plan_id, flags @ ..] => CommandPayload::StartPlan {
                plan_id: plan_id.to_string(),
                ignore_errors: flags.contains(&"--ignore-errors"),
                skip_calibration: flags.contains(&"--skip-calibration"),
                definition: None,
            },
            [] => bail!("usage: start-plan <target> <plan> [--ignore-errors] [--skip-calibration]"),
        },
        "resume" => match rest.as_slice() {
            [plan_id, maneuver_id] => CommandPayload::ResumePlan {
                plan_id: plan_id.to_string(),
                maneuver_id: maneuver_id.to_string(),
            },
            _ => bail!("usage: resume <target> <plan> <maneuver>"),
        },
        other => bail!("unknown command {other:?}"),
    };

    Ok(OperatorCommand::Submit {
        target: target.to_string(),
        via,
        command,
    })
}
