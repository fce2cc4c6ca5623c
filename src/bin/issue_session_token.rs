//! CLI tool to mint a session token for local testing.
//!
//! Usage:
//!   cargo run --bin issue-session-token -- --username alice --expires-in 7d

use std::env;

use sitedock_lib::auth::issue_session_token;
use sitedock_lib::config::Config;
use uuid::Uuid;

fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let mut username: Option<String> = None;
    let mut user_id: Option<String> = None;
    let mut role = "user".to_string();
    let mut expires_in = "1d".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--username" | "-u" => {
                i += 1;
                if i < args.len() {
                    username = Some(args[i].clone());
                }
            }
            "--user-id" => {
                i += 1;
                if i < args.len() {
                    user_id = Some(args[i].clone());
                }
            }
            "--role" | "-r" => {
                i += 1;
                if i < args.len() {
                    role = args[i].clone();
                }
            }
            "--expires-in" | "-e" => {
                i += 1;
                if i < args.len() {
                    expires_in = args[i].clone();
                }
            }
            "--help" | "-h" => {
                print_usage();
                return;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let username = match username {
        Some(u) => u,
        None => {
            eprintln!("Error: --username is required");
            print_usage();
            std::process::exit(1);
        }
    };

    let user_id = match user_id.as_deref().map(Uuid::parse_str) {
        None => Uuid::now_v7(),
        Some(Ok(id)) => id,
        Some(Err(e)) => {
            eprintln!("Error: invalid --user-id: {}", e);
            std::process::exit(1);
        }
    };

    let ttl_secs = match parse_duration(&expires_in) {
        Some(secs) => secs,
        None => {
            eprintln!(
                "Error: Invalid duration '{}'. Use a number followed by h, d or y",
                expires_in
            );
            std::process::exit(1);
        }
    };

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    let token = match issue_session_token(&config.session_secret, user_id, &username, &role, ttl_secs)
    {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error signing token: {}", e);
            std::process::exit(1);
        }
    };

    println!();
    println!("════════════════════════════════════════════════════════════════");
    println!("  Session Token Issued");
    println!("════════════════════════════════════════════════════════════════");
    println!();
    println!("  User ID:  {}", user_id);
    println!("  Username: {}", username);
    println!("  Role:     {}", role);
    println!("  Expires:  in {}", expires_in);
    println!();
    println!("  Token:    {}", token);
    println!();
    println!("════════════════════════════════════════════════════════════════");
    println!();
}

/// Parse `12h`, `7d` or `1y` into seconds.
fn parse_duration(value: &str) -> Option<i64> {
    let (digits, unit) = value.split_at(value.len().checked_sub(1)?);
    let amount: i64 = digits.parse().ok().filter(|n| *n > 0)?;
    let unit_secs = match unit {
        "h" => 3_600,
        "d" => 86_400,
        "y" => 365 * 86_400,
        _ => return None,
    };
    amount.checked_mul(unit_secs)
}

fn print_usage() {
    eprintln!();
    eprintln!("Usage: issue-session-token --username <name> [--user-id <uuid>] [--role <role>] [--expires-in <duration>]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --username, -u    Username carried in the token (required)");
    eprintln!("  --user-id         Owner id (default: a fresh UUID)");
    eprintln!("  --role, -r        Role claim (default: user)");
    eprintln!("  --expires-in, -e  Lifetime: 12h, 7d, 1y (default: 1d)");
    eprintln!("  --help, -h        Show this help");
    eprintln!();
}
