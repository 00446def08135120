use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result, anyhow};
use log::{info, warn};

use material_forge::builder;
use material_forge::merge::clean_response_text;
use material_forge::repair::repair_graph;
use material_forge::runtime::MemoryRuntime;
use material_forge::schema::{GraphRole, parse_material};
use material_forge::session::ensure_output_node;

#[derive(Debug, Default, Clone)]
struct Cli {
    input: Option<PathBuf>,
    raw: bool,
    report_json: bool,
}

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--raw" => {
                cli.raw = true;
                i += 1;
            }
            "--report-json" => {
                cli.report_json = true;
                i += 1;
            }
            "--input" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --input"));
                };
                cli.input = Some(PathBuf::from(v));
                i += 2;
            }
            other if !other.starts_with('-') && cli.input.is_none() => {
                cli.input = Some(PathBuf::from(other));
                i += 1;
            }
            other => return Err(anyhow!("unknown argument: {other}")),
        }
    }
    Ok(cli)
}

fn run(cli: &Cli) -> Result<bool> {
    let path = cli
        .input
        .as_ref()
        .ok_or_else(|| anyhow!("usage: material-forge [--raw] [--report-json] <material.json>"))?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;

    let (text, has_marker) = if cli.raw {
        clean_response_text(&text)
    } else {
        (text, false)
    };
    if has_marker {
        warn!("input carries a continuation marker, building the partial material");
    }

    let mut spec = parse_material(&text, GraphRole::Complete)?;
    ensure_output_node(&mut spec);
    let corrections = repair_graph(&mut spec);
    if !corrections.is_empty() {
        info!("applied {} repair correction(s)", corrections.len());
    }

    let mut runtime = MemoryRuntime::new()?;
    let mut report = builder::build(&mut runtime, &spec)?;
    report.truncated = has_marker;

    if cli.report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(report.is_complete())
}

fn main() -> ExitCode {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_cli(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(2);
        }
    };
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
