use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ingress_auth::rules::load_rules_file;

#[derive(Parser)]
#[command(name = "authctl")]
#[command(about = "Operator CLI for ingress-auth", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:9000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the service for a decision as the ingress would
    Check {
        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        password: Option<String>,

        /// URL of the protected resource, sent as X-Original-URL
        #[arg(long = "original-url")]
        original_url: String,

        #[arg(long, default_value = "GET")]
        method: String,

        /// Client address, sent as X-Real-IP
        #[arg(long)]
        ip: Option<String>,
    },
    /// Show backend health
    Health,
    /// Parse a rules file and print the rules it contains
    LintRules { file: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Check {
            user,
            password,
            original_url,
            method,
            ip,
        } => check(&cli.url, user, password, &original_url, &method, ip).await,
        Commands::Health => health(&cli.url).await,
        Commands::LintRules { file } => lint_rules(&file),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn check(
    url: &str,
    user: Option<String>,
    password: Option<String>,
    original_url: &str,
    method: &str,
    ip: Option<String>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert("x-original-url", HeaderValue::from_str(original_url)?);
    if let Some(ip) = ip {
        headers.insert("x-real-ip", HeaderValue::from_str(&ip)?);
    }
    if let Some(user) = user {
        let credential = format!("{}:{}", user, password.unwrap_or_default());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", STANDARD.encode(credential)))?,
        );
    }

    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
    let res = reqwest::Client::new()
        .request(method, format!("{}/", url.trim_end_matches('/')))
        .headers(headers)
        .send()
        .await?;

    let status = res.status();
    println!("Status: {}", status);
    for name in ["x-user", "x-groups", "www-authenticate", "x-request-id"] {
        if let Some(value) = res.headers().get(name).and_then(|v| v.to_str().ok()) {
            println!("{}: {}", name, value);
        }
    }

    Ok(if status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn health(url: &str) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let res = reqwest::get(format!("{}/health", url.trim_end_matches('/'))).await?;
    let status = res.status();
    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);

    Ok(if status.is_success() {
        ExitCode::SUCCESS
    } else {
        eprintln!("Service reported status {}", status);
        ExitCode::FAILURE
    })
}

fn lint_rules(file: &Path) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let rules = load_rules_file(file)?;
    for (index, rule) in rules.rules().iter().enumerate() {
        println!("{:>3}  {}", index + 1, rule);
    }
    println!("{} rule(s); unmatched requests: {}", rules.len(), rules.default_action());
    Ok(ExitCode::SUCCESS)
}
