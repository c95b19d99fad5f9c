use colored::Colorize;
use gcpflow_cloud::{OperationOutcome, ResourceStatus, ResourceSummary};

/// 結果を表示。失敗は stderr に出す
pub fn print_outcome(outcome: &OperationOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    match &outcome.failure {
        Some(failure) => {
            eprintln!(
                "{} {}",
                format!("✗ [{}]", failure.kind).red().bold(),
                failure.message
            );
        }
        None if outcome.is_no_op() => {
            println!("{} {}", "ℹ".yellow(), outcome.message);
        }
        None => {
            println!("{}", format!("✓ {}", outcome.message).green().bold());
            if !outcome.remote_operation_id.is_empty() {
                println!(
                    "  operation: {} ({})",
                    outcome.remote_operation_id.cyan(),
                    outcome.status
                );
            }
        }
    }

    if !outcome.per_step_results.is_empty() {
        println!();
        for (i, step) in outcome.per_step_results.iter().enumerate() {
            let mark = if step.is_success() {
                "✓".green()
            } else {
                "✗".red()
            };
            println!(
                "  {}. {} {:<24} {}",
                i + 1,
                mark,
                step.step.as_deref().unwrap_or("-"),
                step.message.dimmed()
            );
        }
    }

    match outcome.resources.as_slice() {
        [] => {}
        [single] => print_details(single),
        many => {
            println!();
            for resource in many {
                print_row(resource);
            }
        }
    }
    Ok(())
}

fn colored_status(status: ResourceStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        ResourceStatus::Running | ResourceStatus::Ready => text.green(),
        ResourceStatus::Terminated | ResourceStatus::Suspended => text.dimmed(),
        ResourceStatus::Error => text.red(),
        _ => text.yellow(),
    }
}

fn print_row(resource: &ResourceSummary) {
    println!(
        "  • {:<28} {:<12} {:<16} {}",
        resource.name.cyan(),
        colored_status(resource.status),
        resource.location.to_string(),
        resource.machine_type.as_deref().unwrap_or("")
    );
}

fn print_details(resource: &ResourceSummary) {
    println!();
    println!("  {}: {}", resource.kind, resource.name.cyan().bold());
    println!("  status:   {}", colored_status(resource.status));
    println!("  location: {}", resource.location);
    if let Some(machine_type) = &resource.machine_type {
        println!("  machine:  {}", machine_type);
    }
    if !resource.labels.is_empty() {
        println!("  labels:");
        for (key, value) in &resource.labels {
            println!("    {}={}", key, value);
        }
    }
    if !resource.metadata.is_empty() {
        println!("  metadata:");
        for (key, value) in &resource.metadata {
            println!("    {}={}", key, value);
        }
    }
    let mut keys: Vec<&String> = resource.attributes.keys().collect();
    keys.sort();
    for key in keys {
        println!("  {}: {}", key, resource.attributes[key]);
    }
}
