// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

use actix_web::rt::System;
use actix_web::{middleware::Logger, web, App, HttpServer};
use log::{info, LevelFilter};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tagledger::api;
use tagledger::app_state::AppState;
use tagledger::config::{Config, ValidatedConfig};
use tagledger::iam::middleware::TokenAuthMiddlewareFactory;
use tagledger::iam::{StaticTokenVerifier, TokenVerifier};

fn main() {
    let exit_code = run();
    std::process::exit(exit_code);
}

fn run() -> i32 {
    let parsed_args = match parse_args() {
        Ok(args) => args,
        Err(error) => {
            eprintln!("❌ Invalid command line arguments: {}", error);
            eprintln!("❌ Use -c <path> to point at the configuration file.");
            return 1;
        }
    };

    if parsed_args.help {
        print!("{}", help_text());
        return 0;
    }

    let config = match Config::load_and_validate(&parsed_args.config_path) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("❌ Configuration error: {}", error);
            eprintln!("❌ Application cannot start with invalid configuration.");
            return 1;
        }
    };

    if parsed_args.check_only {
        println!("Configuration {} is valid.", parsed_args.config_path.display());
        return 0;
    }

    match System::new().block_on(run_server(config)) {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("❌ Server failed to start: {}", error);
            1
        }
    }
}

async fn run_server(config: ValidatedConfig) -> std::io::Result<()> {
    let log_level = config
        .logging
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()
        .map_err(|error| std::io::Error::other(error.to_string()))?;

    info!("Starting {} - {}", config.app.name, config.app.description);
    info!(
        "Listening on {}:{} with {} workers",
        config.server.host, config.server.port, config.server.workers
    );
    if config.users.is_empty() {
        log::warn!("No users configured; every request will be rejected as unauthenticated");
    }

    let verifier: Arc<dyn TokenVerifier> = Arc::new(StaticTokenVerifier::from_config(&config.users));
    let state = web::Data::new(AppState::new(&config));
    info!("✅ Progress registry started");

    let state_for_server = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state_for_server.clone())
            .app_data(web::Data::new(verifier.clone()))
            .wrap(Logger::new(r#"%a "%r" %s %b %T"#))
            .wrap(TokenAuthMiddlewareFactory)
            .configure(api::configure)
    })
    .workers(config.server.workers)
    .bind((config.server.host.as_str(), config.server.port))?
    .run();

    let result = server.await;
    state.shutdown().await;
    result
}

struct ParsedArgs {
    config_path: PathBuf,
    check_only: bool,
    help: bool,
}

fn parse_args() -> Result<ParsedArgs, String> {
    parse_args_from(std::env::args().skip(1))
}

fn parse_args_from<I>(args: I) -> Result<ParsedArgs, String>
where
    I: IntoIterator<Item = String>,
{
    let mut config_path = PathBuf::from("config.yaml");
    let mut check_only = false;
    let mut help = false;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => help = true,
            "-c" | "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("Missing value for {}", arg))?;
                config_path = PathBuf::from(value);
            }
            "--check" => check_only = true,
            other => return Err(format!("Unknown argument '{}'", other)),
        }
    }

    Ok(ParsedArgs {
        config_path,
        check_only,
        help,
    })
}

fn help_text() -> String {
    [
        "TagLedger server",
        "",
        "Usage: tagledger [OPTIONS]",
        "",
        "Options:",
        "  -c, --config <path>  Configuration file (default: config.yaml)",
        "      --check          Validate the configuration and exit",
        "  -h, --help           Show this help",
        "",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::parse_args_from;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parse_args_defaults_to_local_config() {
        let parsed = parse_args_from(Vec::new()).expect("parse args");
        assert_eq!(parsed.config_path.to_str(), Some("config.yaml"));
        assert!(!parsed.check_only);
        assert!(!parsed.help);
    }

    #[test]
    fn parse_args_accepts_config_path() {
        let parsed = parse_args_from(args(&["-c", "/etc/tagledger.yaml"])).expect("parse args");
        assert_eq!(parsed.config_path.to_str(), Some("/etc/tagledger.yaml"));
    }

    #[test]
    fn parse_args_accepts_check_flag() {
        let parsed = parse_args_from(args(&["--check", "--config", "x.yaml"])).expect("parse args");
        assert!(parsed.check_only);
        assert_eq!(parsed.config_path.to_str(), Some("x.yaml"));
    }

    #[test]
    fn parse_args_rejects_unknown_flags() {
        assert!(parse_args_from(args(&["--daemon"])).is_err());
    }

    #[test]
    fn parse_args_requires_a_config_value() {
        match parse_args_from(args(&["-c"])) {
            Err(error) => assert!(error.contains("-c")),
            Ok(_) => panic!("expected missing value error"),
        }
    }
}
