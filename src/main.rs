//! Interactive shell over the tablet engine.
//!
//! Reads statements from stdin, splits multi-statement lines on top-level
//! `;` (single-quoted strings respected), drops `--` comment lines, and
//! prints rows or affected-row counts. All storage knowledge stays behind
//! the [`Database`] façade.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use tracing::error;

use tablet::config::Config;
use tablet::{Database, QueryOutput, Row};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);

    let mut config = match Config::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load config: {e}");
            return;
        }
    };
    if let Some(dir) = args
        .iter()
        .position(|a| a == "--data-dir")
        .and_then(|i| args.get(i + 1))
    {
        config.data_dir = PathBuf::from(dir);
    }
    if args.iter().any(|a| a == "--no-auth") {
        config.auth_enabled = false;
    }

    let mut db = match Database::from_config(&config) {
        Ok(db) => db,
        Err(e) => {
            error!("failed to open database: {e}");
            return;
        }
    };

    let token = if config.auth_enabled {
        match login_or_register(&mut db) {
            Some(token) => Some(token),
            None => return,
        }
    } else {
        None
    };

    repl(&mut db, token.as_deref());
}

fn print_usage() {
    println!("tablet — embeddable SQL datastore shell");
    println!();
    println!("USAGE: tablet [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  --config <path>    Config file (default: $XDG_CONFIG_HOME/tablet/config.toml)");
    println!("  --data-dir <path>  Persistence directory override");
    println!("  --no-auth          Disable logins and ownership scoping");
    println!("  -h, --help         Show this help");
}

fn login_or_register(db: &mut Database) -> Option<String> {
    let username = prompt("Username: ")?;
    let password = prompt("Password: ")?;

    if let Ok(token) = db.login(&username, &password) {
        println!("Logged in as {username}");
        return Some(token);
    }

    let create = prompt("User not found or bad password. Create user? (y/n): ")?;
    if !create.eq_ignore_ascii_case("y") {
        return None;
    }
    let email = prompt("Email (optional): ")?;
    let is_admin = i64::from(prompt("Admin? (y/n): ")?.eq_ignore_ascii_case("y"));

    if let Err(e) = db.register_user(&username, &password, &email, is_admin) {
        println!("ERROR: {e}");
        return None;
    }
    match db.login(&username, &password) {
        Ok(token) => {
            println!("Logged in as {username}");
            Some(token)
        }
        Err(e) => {
            println!("ERROR: {e}");
            None
        }
    }
}

fn repl(db: &mut Database, token: Option<&str>) {
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with("--") {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        for stmt in split_statements(line) {
            match db.execute(stmt, token) {
                Ok(QueryOutput::Rows(rows)) => print_rows(&rows),
                Ok(QueryOutput::Affected(n)) => println!("{n}"),
                Err(e) => println!("ERROR: {e}"),
            }
        }
    }
    if let Err(e) = db.close() {
        println!("ERROR: {e}");
    }
}

fn prompt(label: &str) -> Option<String> {
    print!("{label}");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

/// Split input on top-level `;`, leaving `;` inside single-quoted strings
/// alone. Empty fragments are dropped.
fn split_statements(input: &str) -> Vec<&str> {
    let mut stmts = Vec::new();
    let mut in_str = false;
    let mut start = 0;
    for (i, ch) in input.char_indices() {
        match ch {
            '\'' => in_str = !in_str,
            ';' if !in_str => {
                let stmt = input[start..i].trim();
                if !stmt.is_empty() {
                    stmts.push(stmt);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = input[start..].trim();
    if !last.is_empty() {
        stmts.push(last);
    }
    stmts
}

fn print_rows(rows: &[Row]) {
    if rows.is_empty() {
        println!("[]");
        return;
    }
    for row in rows {
        let mut obj = serde_json::Map::with_capacity(row.len());
        for (name, value) in row {
            obj.insert(name.clone(), value.to_json());
        }
        match serde_json::to_string(&serde_json::Value::Object(obj)) {
            Ok(json) => println!("{json}"),
            Err(e) => println!("ERROR: {e}"),
        }
    }
}
