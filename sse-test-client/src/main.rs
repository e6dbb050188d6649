use anyhow::Result;
use clap::Parser;
use colored::*;

mod api_client;
mod output;
mod scenarios;
mod sse_client;

use api_client::ApiClient;
use output::print_test_summary;

#[derive(Parser)]
#[command(name = "sse-test-client")]
#[command(about = "SSE Integration Testing Tool")]
struct Cli {
    /// Base URL of the backend (e.g., http://localhost:4000)
    #[arg(long)]
    base_url: String,

    /// Test scenario to run
    #[arg(long, value_enum)]
    scenario: ScenarioChoice,

    /// Delays in milliseconds for the simulated operations of the results scenario
    #[arg(long, value_delimiter = ',', default_values_t = [300u64, 100, 200])]
    delays_ms: Vec<u64>,

    /// Indices of operations that should fail in the results scenario
    #[arg(long, value_delimiter = ',', default_values_t = [1usize])]
    fail: Vec<usize>,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Stream simulated operations and wait for close
    Results,
    /// Bridge emitted events and check the renaming table
    Bridge,
    /// Run all scenarios
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    let api_client = ApiClient::new(reqwest::Client::new(), cli.base_url.clone());

    println!("{}", "=== TEST PHASE ===".bright_white().bold());

    let mut results = Vec::new();

    match cli.scenario {
        ScenarioChoice::Results => {
            results.push(scenarios::test_results(&api_client, &cli.delays_ms, &cli.fail).await?);
        }
        ScenarioChoice::Bridge => {
            results.push(scenarios::test_bridge(&api_client).await?);
        }
        ScenarioChoice::All => {
            results.push(scenarios::test_results(&api_client, &cli.delays_ms, &cli.fail).await?);
            results.push(scenarios::test_bridge(&api_client).await?);
        }
    }

    // Print summary
    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
