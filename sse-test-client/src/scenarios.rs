use anyhow::Result;
use colored::*;
use serde_json::json;
use std::time::{Duration, Instant};

use crate::api_client::ApiClient;
use crate::output::{print_event, TestResult};
use crate::sse_client::Connection;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Stream a batch of operations and check every one is reported before `close`.
pub async fn test_results(
    api_client: &ApiClient,
    delays_ms: &[u64],
    fail: &[usize],
) -> Result<TestResult> {
    let scenario = "Result stream".to_string();
    println!("\n{} Testing {}", "→".blue(), scenario);
    let start = Instant::now();

    let url = api_client.results_url(delays_ms, fail);
    let mut connection = Connection::establish(&url, "Results".to_string()).await?;

    let slowest = delays_ms.iter().copied().max().unwrap_or(0);
    let timeout = EVENT_TIMEOUT + Duration::from_millis(slowest);
    let events = match connection.collect_until("close", timeout).await {
        Ok(events) => events,
        Err(e) => {
            return Ok(TestResult {
                scenario,
                passed: false,
                message: Some(e.to_string()),
                duration: start.elapsed(),
            })
        }
    };

    for event in &events {
        print_event(&connection.label, event);
    }
    if connection.comments > 0 {
        println!("   {} keep-alive comment(s)", connection.comments);
    }

    let successes = events.iter().filter(|e| e.event_type == "success").count();
    let errors = events.iter().filter(|e| e.event_type == "error").count();
    let expected_errors = fail.iter().filter(|i| **i < delays_ms.len()).count();

    let passed = successes + errors == delays_ms.len() && errors == expected_errors;
    let message = (!passed).then(|| {
        format!(
            "expected {} outcome(s) with {} error(s), got {} success and {} error",
            delays_ms.len(),
            expected_errors,
            successes,
            errors
        )
    });

    Ok(TestResult {
        scenario,
        passed,
        message,
        duration: start.elapsed(),
    })
}

/// Bridge `progress` to `update` and check mapped and unmapped events.
pub async fn test_bridge(api_client: &ApiClient) -> Result<TestResult> {
    let scenario = "Event bridge".to_string();
    println!("\n{} Testing {}", "→".blue(), scenario);
    let start = Instant::now();

    let url = api_client.events_url("progress:update");
    let mut connection = Connection::establish(&url, "Bridge".to_string()).await?;

    // The bridge subscribes once the server has accepted the request
    let payload = json!({ "pct": 50 });
    let mut attempts = 0;
    while api_client.emit("progress", &payload).await? == 0 {
        attempts += 1;
        if attempts > 50 {
            return Ok(TestResult {
                scenario,
                passed: false,
                message: Some("Bridge never subscribed to progress".to_string()),
                duration: start.elapsed(),
            });
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let update = match connection.wait_for_event("update", EVENT_TIMEOUT).await {
        Ok(event) => event,
        Err(e) => {
            return Ok(TestResult {
                scenario,
                passed: false,
                message: Some(e.to_string()),
                duration: start.elapsed(),
            })
        }
    };
    print_event(&connection.label, &update);

    let payload_matches = serde_json::from_str::<serde_json::Value>(&update.data)
        .map(|data| data == payload)
        .unwrap_or(false);

    api_client.emit("debug", &json!({ "ignored": true })).await?;
    let leaked = connection
        .wait_for_event("debug", Duration::from_millis(500))
        .await
        .is_ok();

    let passed = payload_matches && !leaked;
    let message = match (payload_matches, leaked) {
        (false, _) => Some(format!("unexpected update payload: {}", update.data)),
        (_, true) => Some("unmapped debug event was forwarded".to_string()),
        _ => None,
    };

    Ok(TestResult {
        scenario,
        passed,
        message,
        duration: start.elapsed(),
    })
}
