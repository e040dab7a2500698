//! Create a customer, credit them and issue a scoped token.
//!
//! Needs a service credential:
//!
//! ```sh
//! SELAS_ANON_KEY=... SELAS_TOKEN=<service token> cargo run --example customer_tokens -- cus_42
//! ```

use selas_rs::SelasClient;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let external_id = std::env::args().nth(1).unwrap_or_else(|| "demo-customer".to_string());
    let client = SelasClient::from_env()?;

    let customer = match client.get_customer(&external_id).await? {
        Some(customer) => customer,
        None => client.create_customer(&external_id).await?,
    };
    println!("Customer {} has {} credits", customer.external_id, customer.credits);

    let balance = client.add_credits(&external_id, 10.0).await?;
    println!("New balance: {}", balance.current_balance);

    let token = client.create_token(&external_id, 5, 3600, "demo token").await?;
    println!("Token {} (quota {}, ttl {}s)", token.key, token.quota, token.ttl);

    Ok(())
}
