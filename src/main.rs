use clap::Parser;
use genus::commands::{Cli, Commands};
use genus::scenario::{self, ScenarioReport, StressPlan, SCENARIOS};
use genus::utils::logger::init_logger;
use genus::RegistryConfig;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // 初始化日志系统
    if let Err(err) = init_logger(cli.log_level.as_deref(), cli.log_file.clone()) {
        eprintln!("failed to initialise logging: {err}");
        return ExitCode::from(1);
    }

    match main_impl(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

fn main_impl(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = RegistryConfig::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Scenario { name, json } => {
            let reports = if name == "all" {
                scenario::run_all()?
            } else {
                vec![scenario::run(&name)?]
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    print_report(report);
                }
            }

            let failed = reports.iter().filter(|report| !report.passed()).count();
            if failed > 0 {
                eprintln!("{failed} scenario(s) failed");
                return Ok(ExitCode::from(1));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stress {
            prefill,
            prefill_capacity,
            contenders,
            capacity,
            json,
        } => {
            let plan = StressPlan {
                prefill,
                prefill_capacity,
                contenders,
                capacity,
            };
            let report = scenario::stress(config, plan)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("accepted: {}", report.accepted);
                println!("rejected: {}", report.rejected);
                println!(
                    "reserved: {}/{}",
                    report.snapshot.total_reserved, report.snapshot.total_budget
                );
                for entry in &report.snapshot.entries {
                    println!(
                        "   genus {:>4}  capacity {:>3}  owner {}",
                        entry.id.as_raw(), entry.capacity, entry.owner
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::List => {
            for name in SCENARIOS {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_report(report: &ScenarioReport) {
    println!("=== {} ===", report.name);
    for check in &report.checks {
        let mark = if check.passed { "[PASS]" } else { "[FAIL]" };
        println!("   {} {} ({})", mark, check.label, check.detail);
    }
    println!();
}
