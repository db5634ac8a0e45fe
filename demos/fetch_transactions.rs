use chrono::Days;
use plaid_connect::{Client, ConnectGetOptions, Environment};
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let client_id = env::var("PLAID_CLIENT_ID")
        .map_err(|_| "Set PLAID_CLIENT_ID in your environment or .env file")?;
    let secret =
        env::var("PLAID_SECRET").map_err(|_| "Set PLAID_SECRET in your environment or .env file")?;
    let access_token = env::var("PLAID_ACCESS_TOKEN")
        .map_err(|_| "Set PLAID_ACCESS_TOKEN in your environment or .env file")?;

    let client = Client::new(client_id, secret, Environment::Sandbox)?;

    // Fetch transactions for the last 30 days.
    let end = chrono::Utc::now().date_naive();
    let start = end
        .checked_sub_days(Days::new(29))
        .expect("valid start date window");
    let options = ConnectGetOptions {
        gte: Some(start),
        lte: Some(end),
        ..Default::default()
    };

    let response = client
        .connect_get(&access_token, Some(&options))
        .await?
        .connected()
        .ok_or("institution asked for MFA; answer it with connect_cli step")?;

    println!(
        "Fetched {} transactions from {} to {}:",
        response.transactions.len(),
        start,
        end
    );
    for txn in &response.transactions {
        println!(
            "{} | {} {} {}",
            txn.id,
            txn.date,
            txn.amount,
            txn.name.as_deref().unwrap_or("")
        );
    }

    Ok(())
}
