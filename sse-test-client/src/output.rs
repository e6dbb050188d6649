use colored::*;
use std::time::Duration;

use crate::sse_client::Event;

#[derive(Debug)]
pub struct TestResult {
    pub scenario: String,
    pub passed: bool,
    pub message: Option<String>,
    pub duration: Duration,
}

pub fn print_event(label: &str, event: &Event) {
    let name = match event.event_type.as_str() {
        "error" => event.event_type.red(),
        "close" => event.event_type.cyan(),
        _ => event.event_type.yellow(),
    };

    println!("[{}] {} event received", label.bright_blue().bold(), name);

    match serde_json::from_str::<serde_json::Value>(&event.data) {
        Ok(json) if json.is_object() || json.is_array() => {
            if let Ok(pretty) = serde_json::to_string_pretty(&json) {
                println!("   {}", pretty.dimmed());
            }
        }
        _ if !event.data.is_empty() => println!("   {}", event.data.dimmed()),
        _ => {}
    }
}

pub fn print_test_summary(results: &[TestResult]) {
    println!("\n{}", "=== TEST SUMMARY ===".bright_white().bold());

    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = total - passed;

    for result in results {
        let status = if result.passed {
            "PASS".green().bold()
        } else {
            "FAIL".red().bold()
        };

        println!("[{}] {} ({:?})", status, result.scenario, result.duration);

        if let Some(msg) = &result.message {
            println!("      {}", msg.dimmed());
        }
    }

    println!(
        "\n{}: {} passed, {} failed",
        "Results".bold(),
        passed.to_string().green(),
        failed.to_string().red()
    );
}
