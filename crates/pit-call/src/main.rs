use std::process;

use anyhow::Context;
use pit_sdk::{Params, TaskConfig};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let (method, params) = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: pit-call <method> [key=value ...]");
            eprintln!();
            eprintln!("Calls one orchestrator operation over the task control channel");
            eprintln!("(address taken from PIT_SOCKET) and prints the result to stdout.");
            eprintln!();
            eprintln!("Examples:");
            eprintln!("  pit-call get_secret key=db_password");
            eprintln!("  pit-call ftp_list secret=ftp_main directory=/incoming pattern='*.csv'");
            process::exit(2);
        }
    };

    pit_sdk::logging::init_tracing();

    if let Err(e) = run(&method, params) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<(String, Params), String> {
    let mut method: Option<String> = None;
    let mut params = Params::new();

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return Err(String::new()),
            flag if flag.starts_with('-') => return Err(format!("unknown flag: {flag}")),
            pair if method.is_some() => {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("expected key=value, got '{pair}'"))?;
                if key.is_empty() {
                    return Err(format!("empty parameter name in '{pair}'"));
                }
                params.insert(key.to_string(), value.to_string());
            }
            name => method = Some(name.to_string()),
        }
    }

    let method = method.ok_or("missing required argument: <method>")?;
    Ok((method, params))
}

fn run(method: &str, params: Params) -> anyhow::Result<()> {
    let config = TaskConfig::from_env();
    tracing::debug!(parent: &config.span(), method, params = params.len(), "pit-call");

    let result = config
        .channel()
        .call(method, params)
        .with_context(|| format!("{method} failed"))?;

    if !result.is_empty() {
        println!("{result}");
    }
    Ok(())
}
