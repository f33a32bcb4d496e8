// SPDX-License-Identifier: GPL-3.0-only

mod config;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use part_engine::{PartitionManager, Provider};
use part_types::{AlignmentMode, PartitionFlag, PartitionTypeRequest, TableType, pretty_to_bytes};
use serde::Serialize;

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "partctl")]
#[command(about = "Create, delete and inspect partitions on disks and disk images")]
struct PartCli {
    /// Configuration file (defaults to $XDG_CONFIG_HOME/partctl/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured provider
    #[arg(long, global = true)]
    provider: Option<Provider>,

    #[command(subcommand)]
    command: PartCommand,
}

#[derive(Debug, Subcommand)]
enum PartCommand {
    /// Write a new, empty partition table
    CreateTable {
        disk: String,
        table_type: TableType,
        #[arg(long)]
        ignore_existing: bool,
    },
    /// Add a partition; sizes accept suffixes such as MiB or GiB
    CreatePartition {
        disk: String,
        #[arg(long = "type", default_value = "next")]
        kind: PartitionTypeRequest,
        #[arg(long, value_parser = parse_bytes)]
        start: u64,
        /// 0 takes all free space at the start
        #[arg(long, value_parser = parse_bytes, default_value = "0")]
        size: u64,
        #[arg(long)]
        align: Option<AlignmentMode>,
    },
    DeletePartition {
        disk: String,
        partition: String,
    },
    SetFlag {
        disk: String,
        partition: String,
        flag: PartitionFlag,
        state: FlagState,
    },
    /// Print the disk and its partitions
    Examine {
        disk: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FlagState {
    On,
    Off,
}

#[derive(Serialize)]
struct Done {
    status: &'static str,
}

fn parse_bytes(value: &str) -> Result<u64, String> {
    pretty_to_bytes(value).map_err(|e| e.to_string())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(manager: &PartitionManager, command: PartCommand) -> anyhow::Result<ExitCode> {
    let result = match command {
        PartCommand::CreateTable {
            disk,
            table_type,
            ignore_existing,
        } => manager
            .create_table(&disk, table_type, ignore_existing)
            .map(|()| serde_json::to_value(Done { status: "ok" })),
        PartCommand::CreatePartition {
            disk,
            kind,
            start,
            size,
            align,
        } => {
            let align = align.unwrap_or(manager.config().default_alignment);
            manager
                .create_partition(&disk, kind, start, size, align)
                .map(serde_json::to_value)
        }
        PartCommand::DeletePartition { disk, partition } => manager
            .delete_partition(&disk, &partition)
            .map(|()| serde_json::to_value(Done { status: "ok" })),
        PartCommand::SetFlag {
            disk,
            partition,
            flag,
            state,
        } => manager
            .set_partition_flag(&disk, &partition, flag, matches!(state, FlagState::On))
            .map(|()| serde_json::to_value(Done { status: "ok" })),
        PartCommand::Examine { disk } => manager
            .examine(&disk)
            .map(serde_json::to_value),
    };

    match result {
        Ok(value) => {
            print_json(&value?)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            print_json(&e.report())?;
            Ok(ExitCode::FAILURE)
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = PartCli::parse();

    let config_path = cli.config.unwrap_or_else(config::default_path);
    let mut config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(provider) = cli.provider {
        config.engine.provider = provider;
    }

    logging::init(&config.logging);
    tracing::debug!("Using {:?}", config.engine);

    let manager = PartitionManager::new(config.engine);
    run(&manager, cli.command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_line_is_consistent() {
        PartCli::command().debug_assert();
    }

    #[test]
    fn create_partition_arguments_parse() {
        let cli = PartCli::try_parse_from([
            "partctl",
            "--provider",
            "basic",
            "create-partition",
            "/dev/sdx",
            "--type",
            "logical",
            "--start",
            "1MiB",
            "--size",
            "512MiB",
            "--align",
            "minimal",
        ])
        .unwrap();

        assert_eq!(cli.provider, Some(Provider::Basic));
        match cli.command {
            PartCommand::CreatePartition {
                disk,
                kind,
                start,
                size,
                align,
            } => {
                assert_eq!(disk, "/dev/sdx");
                assert_eq!(kind, PartitionTypeRequest::Logical);
                assert_eq!(start, 1 << 20);
                assert_eq!(size, 512 << 20);
                assert_eq!(align, Some(AlignmentMode::Minimal));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn set_flag_takes_on_or_off() {
        let cli = PartCli::try_parse_from([
            "partctl", "set-flag", "/dev/sdx", "/dev/sdx1", "boot", "on",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            PartCommand::SetFlag {
                flag: PartitionFlag::Boot,
                state: FlagState::On,
                ..
            }
        ));
        assert!(
            PartCli::try_parse_from(["partctl", "set-flag", "/dev/sdx", "/dev/sdx1", "boot", "maybe"])
                .is_err()
        );
    }
}
