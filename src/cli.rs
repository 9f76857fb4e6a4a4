use std::io::{self, Write};

use clap::Parser;
use serde_json::{json, Value};
use uuid::Uuid;
use wordbattle::parser::{self, Command};

const DEFAULT_URL: &str = "http://127.0.0.1:8080";

#[derive(Parser, Debug)]
#[clap(author, version, about = "Interactive client for the word battle API", long_about = None)]
struct Args {
    #[clap(long, env = "WORDBATTLE_URL", default_value = DEFAULT_URL)]
    url: String,
}

struct Client {
    http: reqwest::Client,
    url: String,
}

impl Client {
    async fn call(&self, func_name: &str, data: Value) -> Result<Value, String> {
        let resp = self
        .http
        .post(format!("{}/", self.url.trim_end_matches('/')))
        .json(&json!({ "funcName": func_name, "data": data }))
        .send()
        .await
        .map_err(|e| e.to_string())?;

        let status = resp.status();
        let body: Value = resp.json().await.map_err(|e| e.to_string())?;
        if status.is_success() {
            Ok(body)
        } else {
            let message = body["error"].as_str().unwrap_or("unknown error");
            let kind = body["kind"].as_str().unwrap_or("Error");
            Err(format!("{} ({}): {}", kind, status.as_u16(), message))
        }
    }

    async fn healthy(&self) -> bool {
        match self.http.get(format!("{}/health", self.url.trim_end_matches('/'))).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    print_banner();

    let client = Client { http: reqwest::Client::new(), url: args.url };
    if client.healthy().await {
        println!("[\u{2713}] Connected to Word Battle at {}!", client.url);
    } else {
        println!("[\u{2717}] Could not reach server at {}.", client.url);
        println!("    Make sure to run 'cargo run --release --bin wordbattle' in another terminal.");
        return;
    }
    println!("Type 'HELP' for supported commands or 'EXIT' to quit.\n");

    let stdin = io::stdin();
    let mut buffer = String::new();

    loop {
        print!("wordbattle> ");
        if io::stdout().flush().is_err() {
            break;
        }
        buffer.clear();

        match stdin.read_line(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if buffer.trim().is_empty() { continue; }

        match parser::parse_command(&buffer) {
            Ok(Command::Exit) => break,
            Ok(cmd) => {
                if let Err(e) = execute_command(&client, cmd).await {
                    println!("[\u{26a0}\u{fe0f} Error] {}", e);
                }
            }
            Err(e) => {
                println!("[\u{2717} Syntax Error] {}", e);
                if buffer.to_uppercase().starts_with("REGISTER") {
                    println!("    \u{2139}\u{fe0f}  Hint: Try 'REGISTER \"alice\" \"dragon\" IN \"friends\"'");
                }
            }
        }
    }
}

fn print_banner() {
    println!("\n==================================================");
    println!("   Word Battle CLI - One Word Enters");
    println!("==================================================\n");
}

fn print_help() {
    println!("\n--- Available Commands ---");
    println!("1. REGISTER: REGISTER \"username\" \"word\" [IN \"leaderboard\"]");
    println!("2. USER:     USER 'uuid'");
    println!("3. TOP:      TOP [IN \"leaderboard\"] [LIMIT 10]");
    println!("4. BATTLE:   BATTLE 'uuid'");
    println!("5. REPLAY:   REPLAY 'uuid' AT 1700000000000");
    println!("6. HISTORY:  HISTORY 'uuid'");
    println!("7. EXIT:     Quit\n");
}

async fn execute_command(client: &Client, cmd: Command) -> Result<(), String> {
    match cmd {
        Command::Help => { print_help(); Ok(()) },
        Command::Register { username, word, leaderboard } => {
            let user = client
            .call("registerUser", json!({ "username": username, "word": word, "leaderboard": leaderboard }))
            .await?;
            println!("[\u{2713} OK] Registered {} with id {}", username, user["id"].as_str().unwrap_or("?"));
            Ok(())
        },
        Command::User { id } => {
            let body = client.call("getUser", json!({ "uuid": id })).await?;
            print_user(&body["userRecord"]);
            Ok(())
        },
        Command::Top { leaderboard, limit } => {
            let body = client.call("listTopUsers", json!({ "leaderboard": leaderboard, "limit": limit })).await?;
            let users = body["userRecords"].as_array().cloned().unwrap_or_default();
            println!("\nTop {} players:", users.len());
            for (i, u) in users.iter().enumerate() {
                println!(
                    "  {:>3}. {:<20} {:>8.1}  \"{}\"",
                    i + 1,
                    u["username"].as_str().unwrap_or("?"),
                    u["rating"].as_f64().unwrap_or(0.0),
                    u["word"].as_str().unwrap_or("?")
                );
            }
            println!();
            Ok(())
        },
        Command::Battle { id } => {
            let outcome = client.call("battle", json!({ "uuid": id })).await?;
            print_outcome(id, &outcome);
            Ok(())
        },
        Command::Replay { id, timestamp } => {
            let outcome = client.call("getBattle", json!({ "uuid": id, "timestamp": timestamp })).await?;
            println!("[\u{23f1}\u{fe0f} Replay] Battle at {}:", timestamp);
            print_outcome(id, &outcome);
            Ok(())
        },
        Command::History { id } => {
            let body = client.call("listBattles", json!({ "uuid": id })).await?;
            let battles = body["battles"].as_array().cloned().unwrap_or_default();
            println!("History for {}:", id);
            for (i, b) in battles.iter().enumerate() {
                let won = b["winnerUserRecord"]["id"].as_str() == Some(id.to_string().as_str());
                println!(
                    "  #{} | {} | {} vs {} | {:+.1}",
                    i + 1,
                    b["timestamp"].as_u64().unwrap_or(0),
                    if won { "WIN " } else { "LOSS" },
                    b["otherUserRecord"]["username"].as_str().unwrap_or("?"),
                    b["ratingChange"].as_f64().unwrap_or(0.0)
                );
            }
            Ok(())
        },
        Command::Exit => Ok(()),
    }
}

fn print_user(user: &Value) {
    println!(
        "{} | \"{}\" | rating {:.1} | board {}",
        user["username"].as_str().unwrap_or("?"),
        user["word"].as_str().unwrap_or("?"),
        user["rating"].as_f64().unwrap_or(0.0),
        user["leaderboard"].as_str().unwrap_or("global")
    );
}

fn print_outcome(requester: Uuid, outcome: &Value) {
    let won = outcome["winnerUserRecord"]["id"].as_str() == Some(requester.to_string().as_str());
    println!(
        "\"{}\" vs \"{}\"",
        outcome["userRecord"]["word"].as_str().unwrap_or("?"),
        outcome["otherUserRecord"]["word"].as_str().unwrap_or("?")
    );
    println!("  {}", outcome["message"].as_str().unwrap_or(""));
    println!(
        "  {} ({:+.1}) | timestamp {}",
        if won { "[\u{2713}] Victory" } else { "[\u{2717}] Defeat" },
        outcome["ratingChange"].as_f64().unwrap_or(0.0),
        outcome["timestamp"].as_u64().unwrap_or(0)
    );
}
