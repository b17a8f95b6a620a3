use std::collections::HashMap;
use std::fmt::Write;

use crate::models::HourlyCell;
use crate::pipeline::PipelineResult;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramVolume {
    pub program: String,
    pub contacts: u64,
    pub peak_hour_contacts: u64,
}

pub fn summarize_by_program(cells: &[HourlyCell]) -> Vec<ProgramVolume> {
    let mut map: HashMap<&str, (u64, HashMap<chrono::NaiveDateTime, u64>)> = HashMap::new();

    for cell in cells {
        let entry = map.entry(cell.program.as_str()).or_default();
        entry.0 += cell.contact_count;
        *entry.1.entry(cell.timestamp).or_default() += cell.contact_count;
    }

    let mut volumes: Vec<ProgramVolume> = map
        .into_iter()
        .map(|(program, (contacts, hours))| ProgramVolume {
            program: program.to_string(),
            contacts,
            peak_hour_contacts: hours.into_values().max().unwrap_or(0),
        })
        .collect();

    volumes.sort_by(|a, b| b.contacts.cmp(&a.contacts).then_with(|| a.program.cmp(&b.program)));
    volumes
}

pub fn build_report(result: &PipelineResult) -> String {
    let overview = &result.summary.overview;
    let forecast = &result.forecast;
    let volumes = summarize_by_program(&result.grid.cells);

    let mut output = String::new();

    let _ = writeln!(output, "# Contact Volume Forecast");
    let _ = writeln!(
        output,
        "Data from {} to {} ({} days, {} rows)",
        overview.min_date, overview.max_date, overview.coverage_days, overview.total_rows
    );
    if result.dropped > 0 {
        let _ = writeln!(
            output,
            "{} rows were skipped because their timestamp could not be parsed.",
            result.dropped
        );
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "## Model");
    let _ = writeln!(
        output,
        "- Seasonality: yearly={}, monthly={}, weekly={}, daily={}",
        forecast.seasonality.yearly,
        forecast.seasonality.monthly,
        forecast.seasonality.weekly,
        forecast.seasonality.daily
    );
    let _ = writeln!(
        output,
        "- Hourly totals above {:.2} were clipped before fitting",
        forecast.clip_threshold
    );
    let _ = writeln!(
        output,
        "- Fitted on {} days of hourly totals, converged in {} iterations",
        forecast.coverage_days, forecast.iterations
    );
    let _ = writeln!(output, "- Residual std dev: {:.2} contacts/hour", forecast.residual_std);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Next {} Days", result.summary.next_days.len());

    if result.summary.next_days.is_empty() {
        let _ = writeln!(output, "No forecast available.");
    } else {
        let _ = writeln!(output, "| Date | Predicted | Low | High |");
        let _ = writeln!(output, "|------|-----------|-----|------|");
        for day in &result.summary.next_days {
            let _ = writeln!(
                output,
                "| {} | {:.2} | {:.2} | {:.2} |",
                day.date, day.predicted, day.lower, day.upper
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Volume by Program");

    if volumes.is_empty() {
        let _ = writeln!(output, "No contacts recorded.");
    } else {
        for volume in volumes.iter().take(10) {
            let _ = writeln!(
                output,
                "- {}: {} contacts (peak {} in one hour)",
                volume.program, volume.contacts, volume.peak_hour_contacts
            );
        }
    }

    output
}
