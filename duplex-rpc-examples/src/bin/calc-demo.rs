//! Example: calculator service over the in-process transport
//!
//! Run with:
//!   cargo run --bin calc-demo -- sum 3 10
//!   cargo run --bin calc-demo -- sqrt 10
//!   cargo run --bin calc-demo -- primes 120
//!   cargo run --bin calc-demo -- average 1 2 3 4
//!   PACE_MS=1000 cargo run --bin calc-demo -- max 1 5 3 6 2 20
//!
//! Streaming replies are paced by `PACE_MS`; `RUST_LOG=debug` shows the
//! framework's per-call logs.

use anyhow::{Context, bail};
use duplex_rpc_examples::calc::{AverageRequest, CalcService, MaxRequest};
use duplex_rpc_examples::{init_tracing, pace_from_env};
use futures::StreamExt;

const USAGE: &str = "usage: calc-demo <sum A B | sqrt N | primes N | average N... | max N...>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        bail!(USAGE);
    };
    let args: Vec<String> = args.collect();

    let mut service = CalcService::new();
    if let Some(pace) = pace_from_env()? {
        service = service.pace(pace);
    }
    let client = service.local_client();

    match command.as_str() {
        "sum" => {
            let [first, second] = parse::<i64>(&args)?[..] else {
                bail!(USAGE);
            };
            println!("{first} + {second} = {}", client.sum(first, second).await?);
        }
        "sqrt" => {
            let [number] = parse::<f64>(&args)?[..] else {
                bail!(USAGE);
            };
            println!("sqrt({number}) = {}", client.square_root(number).await?);
        }
        "primes" => {
            let [number] = parse::<i64>(&args)?[..] else {
                bail!(USAGE);
            };
            let mut factors = client.prime_factors(number).await?;
            while let Some(factor) = factors.next().await {
                println!("{}", factor?.prime);
            }
        }
        "average" => {
            let numbers = parse::<f64>(&args)?;
            let mut call = client.average()?;
            for number in numbers {
                println!("sending {number}");
                call.send(AverageRequest { number }).await?;
            }
            println!("average = {}", call.close().await?.average);
        }
        "max" => {
            let numbers = parse::<f64>(&args)?;
            let (mut requests, mut responses) = client.max()?.split();

            let sender = tokio::spawn(async move {
                for number in numbers {
                    println!("sending {number}");
                    requests.send(MaxRequest { number }).await?;
                }
                requests.close().await
            });

            while let Some(response) = responses.next().await {
                println!("new max: {}", response?.max);
            }
            sender.await??;
        }
        other => bail!("unknown command `{other}`\n{USAGE}"),
    }

    Ok(())
}

fn parse<T>(args: &[String]) -> anyhow::Result<Vec<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    args.iter()
        .map(|arg| arg.parse::<T>().with_context(|| format!("invalid number `{arg}`")))
        .collect()
}
