//! CLI command implementations.
//!
//! Thin clients over the library: no command holds authority over a
//! running server; they load, decode, and print.

use std::fs;
use std::path::Path;

use crate::config::ServerConfig;
use crate::delta::{DeltaCodec, DeltaReader};
use crate::oid::ObjectIdSet;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};

/// Parse arguments and dispatch.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    match cli.command {
        Command::CheckConfig { config } => check_config(&config),
        Command::InspectDelta { path } => inspect_delta(&path),
        Command::InspectIdset { path } => inspect_idset(&path),
    }
}

fn check_config(path: &Path) -> CliResult<()> {
    let config = ServerConfig::load(path)?;
    let rendered = serde_json::to_string_pretty(&config)
        .map_err(|e| CliError::Invalid(e.to_string()))?;
    println!("{}", rendered);
    Ok(())
}

fn inspect_delta(path: &Path) -> CliResult<()> {
    let data = fs::read(path)?;
    let codec = DeltaCodec::storage();

    let mut offset = 0;
    let mut frame_index = 0;
    while offset < data.len() {
        let (mut reader, consumed) = DeltaReader::parse(&codec, &data[offset..])?;
        println!(
            "frame {}: object={} version={} delta={} parent={} array_length={} actions={}",
            frame_index,
            reader.object_id(),
            reader.version(),
            reader.is_delta(),
            reader.parent_id(),
            reader.array_length(),
            reader.action_count(),
        );
        if let Some(spec) = reader.type_spec() {
            println!("  type: {} (loader {})", spec.name, spec.loader_desc);
        }
        let mut index = 0;
        while reader.next()? {
            if let Ok(physical) = reader.physical_action() {
                println!(
                    "  action {}: physical field={} reference={}",
                    index, physical.field, physical.is_reference
                );
            } else if let Ok(logical) = reader.logical_action() {
                println!(
                    "  action {}: logical op={:?} params={}",
                    index,
                    logical.op,
                    logical.params.len()
                );
            }
            index += 1;
        }
        offset += consumed;
        frame_index += 1;
    }
    Ok(())
}

fn inspect_idset(path: &Path) -> CliResult<()> {
    let data = fs::read(path)?;
    let set = ObjectIdSet::deserialize(&data)?;
    println!(
        "representation={:?} count={} first={:?} last={:?}",
        set.representation(),
        set.len(),
        set.first().map(|id| id.raw()),
        set.last().map(|id| id.raw()),
    );
    Ok(())
}
