use serde::Serialize;
use tidemark_orm::{MigrationCommand, MigrationReport, MigrationSession, MigrationUnit};

pub async fn up(session: &MigrationSession, target: Option<i64>, dry_run: bool, json: bool) -> anyhow::Result<bool> {
    if dry_run {
        let pending = session.plan(target).await?;
        if json {
            print_json(&pending)?;
        } else if pending.is_empty() {
            println!("✅ Nothing to apply");
        } else {
            println!("Would apply {} migration(s):", pending.len());
            for version in pending {
                println!("  {}", describe(session, version));
            }
        }
        return Ok(true);
    }

    let report = session.execute(MigrationCommand::Up { target }).await?;
    render_report(session, &report, json)
}

pub async fn down(session: &MigrationSession, steps: usize, target: Option<i64>, json: bool) -> anyhow::Result<bool> {
    let command = match target {
        Some(target) => MigrationCommand::DownTo { target },
        None => MigrationCommand::Down { steps },
    };
    let report = session.execute(command).await?;
    render_report(session, &report, json)
}

pub async fn status(session: &MigrationSession, json: bool) -> anyhow::Result<bool> {
    let status = session.status().await?;
    if json {
        print_json(&status)?;
        return Ok(true);
    }

    println!("Migration Status ({}):", session.dialect());
    match status.current_version {
        Some(version) => println!("  Current version: {}", version),
        None => println!("  Current version: none"),
    }
    println!(
        "  Applied: {} / Known: {}",
        status.applied.len(),
        status.total_known_versions
    );
    for entry in &status.applied {
        println!("  ✅ {:>6}  {}  ({})", entry.version, entry.name, entry.applied_at.format("%Y-%m-%d %H:%M:%S"));
    }
    for version in &status.pending_versions {
        println!("  ⏳ {}", describe(session, *version));
    }
    for warning in &status.warnings {
        println!("  ⚠️  {}", warning);
    }
    Ok(true)
}

pub async fn verify(session: &MigrationSession, json: bool) -> anyhow::Result<bool> {
    let results = session.verify().await?;
    let all_passed = results.values().all(|passed| *passed);

    if json {
        print_json(&results)?;
    } else if results.is_empty() {
        println!("No applied migrations define a verification");
    } else {
        for (version, passed) in &results {
            let mark = if *passed { "✅" } else { "❌" };
            println!("  {} {}", mark, describe(session, *version));
        }
    }
    Ok(all_passed)
}

fn render_report(session: &MigrationSession, report: &MigrationReport, json: bool) -> anyhow::Result<bool> {
    if json {
        print_json(report)?;
        return Ok(report.is_success());
    }

    for warning in &report.warnings {
        println!("⚠️  {}", warning);
    }
    for version in &report.applied_versions {
        println!("✅ {} {}", report.direction, describe(session, *version));
    }
    if let (Some(version), Some(error)) = (report.failed_version, &report.error) {
        println!("❌ {} {}: {}", report.direction, describe(session, version), error);
    } else if report.applied_versions.is_empty() {
        println!("✅ Nothing to do");
    } else {
        println!(
            "Completed {} migration(s) in {}ms",
            report.applied_versions.len(),
            report.execution_time_ms
        );
    }
    Ok(report.is_success())
}

fn describe(session: &MigrationSession, version: i64) -> String {
    match session.runner().units().iter().find(|u| u.version() == version) {
        Some(unit) => format!("{} ({})", version, unit.name()),
        None => version.to_string(),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
