use cadence_core::models::{EventTemplate, ExceptionKind};
use cadence_core::overlay::ResolvedOccurrence;
use cadence_core::repository::InstanceDetails;
use chrono::{Local, NaiveDateTime};
use comfy_table::{Attribute, Cell, Color, Row, Table};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

pub fn display_templates(templates: &[EventTemplate]) {
    if templates.is_empty() {
        println!("No events found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Title", "Starts", "Duration", "Rule", "Location"]);

    for template in templates {
        let mut row = Row::new();
        row.add_cell(Cell::new(template.id.to_string()));
        row.add_cell(Cell::new(format!("↻ {}", template.title)).add_attribute(Attribute::Bold));
        row.add_cell(Cell::new(template.anchor_start.format(TIME_FORMAT)));
        row.add_cell(Cell::new(format_duration(template)));
        row.add_cell(Cell::new(template.rule.to_string()));
        row.add_cell(Cell::new(template.location.as_deref().unwrap_or("None")));
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_instances(instances: &[InstanceDetails]) {
    if instances.is_empty() {
        println!("No occurrences found.");
        return;
    }

    let today = Local::now().date_naive();
    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Time", "Title", "Location", "Status"]);

    for instance in instances {
        let mut row = Row::new();
        row.add_cell(Cell::new(instance.id.to_string()));

        let date_cell = Cell::new(instance.occurrence_date);
        row.add_cell(if instance.occurrence_date == today && !instance.cancelled {
            date_cell.fg(Color::Yellow)
        } else {
            date_cell
        });

        row.add_cell(Cell::new(format_range(instance.starts_at, instance.ends_at)));

        let mut title_cell = Cell::new(&instance.title);
        if instance.cancelled {
            title_cell = title_cell.add_attribute(Attribute::CrossedOut).fg(Color::DarkGrey);
        }
        row.add_cell(title_cell);
        row.add_cell(Cell::new(instance.location.as_deref().unwrap_or("None")));

        let status_cell = match instance.exception_kind {
            Some(ExceptionKind::Cancelled) => Cell::new("cancelled").fg(Color::DarkGrey),
            Some(ExceptionKind::Modified) => Cell::new("modified ⚠").fg(Color::Yellow),
            None if instance.cancelled => Cell::new("cancelled").fg(Color::DarkGrey),
            None => Cell::new("scheduled"),
        };
        row.add_cell(status_cell);
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_preview(occurrences: &[ResolvedOccurrence]) {
    if occurrences.is_empty() {
        println!("The rule produces no occurrences.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Date", "Time", "Title", "Location", "Status"]);

    for (index, occurrence) in occurrences.iter().enumerate() {
        let mut row = Row::new();
        row.add_cell(Cell::new(index + 1));
        row.add_cell(Cell::new(occurrence.date));
        row.add_cell(Cell::new(format_range(occurrence.starts_at, occurrence.ends_at)));
        row.add_cell(Cell::new(&occurrence.title));
        row.add_cell(Cell::new(occurrence.location.as_deref().unwrap_or("None")));
        row.add_cell(match (occurrence.cancelled, occurrence.is_exception) {
            (true, _) => Cell::new("cancelled").fg(Color::DarkGrey),
            (false, true) => Cell::new("modified ⚠").fg(Color::Yellow),
            (false, false) => Cell::new("scheduled"),
        });
        table.add_row(row);
    }

    println!("{table}");
}

fn format_range(starts_at: NaiveDateTime, ends_at: NaiveDateTime) -> String {
    if starts_at == ends_at {
        return starts_at.format("%H:%M").to_string();
    }
    if starts_at.date() == ends_at.date() {
        format!("{}-{}", starts_at.format("%H:%M"), ends_at.format("%H:%M"))
    } else {
        format!("{}-{} (+1)", starts_at.format("%H:%M"), ends_at.format("%H:%M"))
    }
}

fn format_duration(template: &EventTemplate) -> String {
    let minutes = template.duration().num_minutes();
    match (minutes / 60, minutes % 60) {
        (0, 0) => "-".to_string(),
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_format_range() {
        assert_eq!(format_range(at(1, 9, 0), at(1, 9, 0)), "09:00");
        assert_eq!(format_range(at(1, 9, 0), at(1, 10, 30)), "09:00-10:30");
        assert_eq!(format_range(at(1, 23, 0), at(2, 0, 30)), "23:00-00:30 (+1)");
    }
}
