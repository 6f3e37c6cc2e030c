use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};

use factions_core::{load_factions_config_from_env, Realm};
use factions_schema::{records_from_json, records_to_json};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1);
    let Some(input) = args.next().map(PathBuf::from) else {
        eprintln!("usage: realm_audit <records.json> [output.json]");
        return ExitCode::from(2);
    };
    let output = args.next().map(PathBuf::from).unwrap_or_else(|| input.clone());

    match run(&input, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(
                target: "factions::audit",
                input = %input.display(),
                error = %err,
                "realm_audit.failed"
            );
            ExitCode::FAILURE
        }
    }
}

fn run(input: &PathBuf, output: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let (config, _) = load_factions_config_from_env();
    let contents = fs::read_to_string(input)?;
    let records = records_from_json(&contents)?;
    let mut realm = Realm::from_records(config, &records)?;

    let report = realm.audit();
    if report.is_clean() {
        info!(target: "factions::audit", "realm_audit.clean");
    } else {
        info!(
            target: "factions::audit",
            report = %serde_json::to_string(&report)?,
            "realm_audit.repaired"
        );
    }

    fs::write(output, records_to_json(&realm.to_records())?)?;
    info!(
        target: "factions::audit",
        output = %output.display(),
        factions = realm.factions.len(),
        claims = realm.claims.len(),
        "realm_audit.written"
    );
    Ok(())
}
