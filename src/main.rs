mod allocator;
mod eligibility;
mod error;
mod models;
mod report;
mod table;
mod validator;

use allocator::{reset_destinations, AllocationSummary, GroupAllocator};
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use eligibility::AllocationRules;
use models::Config;
use report::ValidationReport;
use std::path::Path;
use tracing::{info, warn};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("group_allocator=info".parse()?),
        )
        .init();

    let matches = cli().get_matches();
    let config = load_config(&matches)?;

    let rules = AllocationRules::from_config(&config).context("Invalid allocation rules")?;

    println!("📂 Reading students from: {}", config.input_file);
    let mut table = table::read_data_source(&config.input_file)?;
    if table.skipped > 0 {
        println!("   ⚠️  Skipped {} malformed rows", table.skipped);
    }

    let cleared = reset_destinations(&mut table.records, config.existing_destinations)?;
    if cleared > 0 {
        warn!(cleared, "discarding destinations already present in the input");
    }

    println!("\n🎯 Allocating {} students...", table.records.len());
    let mut allocator = GroupAllocator::new(rules);
    let summary = allocator.allocate_records(&mut table.records, &config.internal_placement_token)?;
    info!(
        assigned = summary.assigned,
        unassigned = summary.unassigned,
        "allocation pass complete"
    );

    let output_file = config.output_path();
    println!("📄 Writing updated table to: {}", output_file);
    table::write_data_source(output_file, &table)?;

    println!("📋 Generating validation report: {}", config.report_file);
    let report = ValidationReport::build(
        &allocator,
        &table.records,
        &config.internal_placement_token,
    );
    report.write_to_file(&config.report_file)?;
    if report.has_violations() {
        warn!("validation report lists constraint violations");
    }

    print_summary(&summary, &report);
    println!("\n✅ Done! Check {} for detailed validation.", config.report_file);
    Ok(())
}

fn cli() -> Command {
    Command::new("group-allocator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Assigns students to capacity-bounded destination groups")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("allocator.toml"),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("Student table to read (overrides input_file)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Where to write the updated table (overrides output_file)"),
        )
        .arg(
            Arg::new("report")
                .short('r')
                .long("report")
                .value_name("FILE")
                .help("Validation report path (overrides report_file)"),
        )
}

/// Loads the configuration, writing the defaults out first if the file is missing.
fn load_config(matches: &ArgMatches) -> Result<Config> {
    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("allocator.toml");

    let mut config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("Failed to load configuration: {}", config_file))?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        let default_config = Config::default();
        default_config
            .save_to_file(config_file)
            .with_context(|| format!("Failed to write configuration: {}", config_file))?;
        default_config
    };

    if let Some(input) = matches.get_one::<String>("input") {
        config.input_file = input.clone();
    }
    if let Some(output) = matches.get_one::<String>("output") {
        config.output_file = Some(output.clone());
    }
    if let Some(report) = matches.get_one::<String>("report") {
        config.report_file = report.clone();
    }

    Ok(config)
}

fn print_summary(summary: &AllocationSummary, report: &ValidationReport) {
    println!("\n📊 SUMMARY");
    println!("==========");
    println!("   Total students: {}", summary.total());
    println!("   Assigned: {}", summary.assigned);
    println!("   Unassigned: {}", summary.unassigned);
    println!(
        "   Average max source group repetition: {:.2}",
        report.average_source_group_repeat
    );
    println!(
        "   Average max profession repetition: {:.2}",
        report.average_profession_repeat
    );
}
