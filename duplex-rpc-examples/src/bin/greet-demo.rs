//! Example: greeting service over the in-process transport
//!
//! Run with:
//!   cargo run --bin greet-demo -- greet
//!   cargo run --bin greet-demo -- deadline 5000
//!   cargo run --bin greet-demo -- deadline 1000
//!   PACE_MS=1000 cargo run --bin greet-demo -- many
//!   cargo run --bin greet-demo -- long
//!   PACE_MS=1000 cargo run --bin greet-demo -- everyone

use std::time::Duration;

use anyhow::{Context, bail};
use duplex_rpc_examples::greet::{GreetEveryone, GreetService, Greeting, LongGreet};
use duplex_rpc_examples::{init_tracing, pace_from_env};
use futures::StreamExt;

const USAGE: &str = "usage: greet-demo <greet | deadline TIMEOUT_MS | many | long | everyone>";

fn people() -> Vec<Greeting> {
    vec![
        Greeting::new("Daria", "Frolova"),
        Greeting::new("Aleksandr", "Frolov"),
        Greeting::new("Banana", "Frolova"),
        Greeting::new("Eldar", "Gadirov"),
        Greeting::new("Marina", "Gadirova"),
        Greeting::new("Nicole", "Gadirova"),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        bail!(USAGE);
    };

    let pace = pace_from_env()?;
    let mut service = GreetService::new();
    if let Some(pace) = pace {
        service = service.pace(pace);
    }
    let client = service.local_client();
    let me = Greeting::new("Daria", "Frolova");

    match command.as_str() {
        "greet" => println!("{}", client.greet(me).await?),
        "deadline" => {
            let millis: u64 = match args.next() {
                Some(raw) => raw
                    .parse()
                    .with_context(|| format!("invalid timeout `{raw}`"))?,
                None => 5000,
            };
            match client
                .greet_with_deadline(me, Duration::from_millis(millis))
                .await
            {
                Ok(result) => println!("{result}"),
                Err(status) => println!("greeting failed: {status}"),
            }
        }
        "many" => {
            let mut replies = client.greet_many_times(me).await?;
            while let Some(reply) = replies.next().await {
                println!("{}", reply?.result);
            }
        }
        "long" => {
            let mut call = client.long_greet()?;
            for person in people() {
                println!("sending {}", person.first_name);
                call.send(LongGreet(person)).await?;
            }
            println!("{}", call.close().await?.result);
        }
        "everyone" => {
            let (mut requests, mut responses) = client.greet_everyone()?.split();

            let sender = tokio::spawn(async move {
                for person in people() {
                    println!("sending {}", person.first_name);
                    requests.send(GreetEveryone(person)).await?;
                    if let Some(pace) = pace {
                        tokio::time::sleep(pace).await;
                    }
                }
                requests.close().await
            });

            while let Some(reply) = responses.next().await {
                println!("{}", reply?.result);
            }
            sender.await??;
        }
        other => bail!("unknown command `{other}`\n{USAGE}"),
    }

    Ok(())
}
