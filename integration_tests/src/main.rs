//! Integration tests for the custom service firmware.
//!
//! Run after flashing the firmware; talks to the device over BLE.

mod ble_client;

use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use colored::Colorize;

use ble_client::BleClient;
use tests::{print_results, run_all_tests, TestResult};

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "BLE integration tests for the custom service firmware")]
struct Args {
    /// BLE device name (e.g. "CustomSvc-AABBCC")
    #[arg(short, long)]
    name: String,

    /// BLE scan timeout in seconds
    #[arg(long, default_value = "10")]
    scan_timeout: u64,
}

/// Disconnect, reconnect and check the stored value survived.
async fn test_reconnect(client: BleClient, args: &Args) -> TestResult {
    let name = "Value persists across reconnect";
    print!("  {} ... ", name);
    std::io::Write::flush(&mut std::io::stdout()).ok();

    let outcome = async {
        let before = client.read_value().await?;
        client.disconnect().await?;
        tokio::time::sleep(Duration::from_millis(500)).await;

        let client =
            BleClient::connect_by_name(&args.name, Duration::from_secs(args.scan_timeout)).await?;
        let after = client.read_value().await?;
        client.disconnect().await?;

        if before != after {
            bail!("Value changed from {:02x?} to {:02x?}", before, after);
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    match outcome {
        Ok(()) => {
            println!("{}", "PASS".green().bold());
            TestResult {
                name: name.to_string(),
                passed: true,
                message: None,
            }
        }
        Err(e) => {
            println!("{}", "FAIL".red().bold());
            println!("    {}", e.to_string().red());
            TestResult {
                name: name.to_string(),
                passed: false,
                message: Some(e.to_string()),
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    println!("{}", "Custom Service Integration Tests".bold());
    println!("Device: BLE (scanning for \"{}\")", args.name);
    println!();

    println!("Connecting to device...");
    let client =
        BleClient::connect_by_name(&args.name, Duration::from_secs(args.scan_timeout)).await?;
    println!("{}", "Connected!".green());

    println!("\nRunning tests...\n");

    let mut results = run_all_tests(&client).await;
    results.push(test_reconnect(client, &args).await);
    print_results(&results);

    // Exit with error code if any tests failed
    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
