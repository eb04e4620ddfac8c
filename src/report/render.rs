//! Plain-text rendering of the report list.

use crate::core::event::format_timestamp;
use crate::report::reconciler::ReportItem;

/// Shown when there is nothing to list.
pub const EMPTY_MESSAGE: &str = "No hay eventos para mostrar";

/// One report card: kind and label on the first line, timestamp below.
pub fn render_report(item: &ReportItem) -> String {
    format!(
        "{} • {}\n{}",
        item.kind.display_name(),
        item.label,
        format_timestamp(&item.occurred_at)
    )
}

pub fn render_reports(items: &[ReportItem]) -> String {
    if items.is_empty() {
        return EMPTY_MESSAGE.to_string();
    }
    items
        .iter()
        .map(render_report)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::parse_timestamp;
    use crate::core::EventKind;

    #[test]
    fn test_card_layout() {
        let item = ReportItem {
            kind: EventKind::Proximity,
            label: "Objeto detectado cerca".to_string(),
            occurred_at: parse_timestamp("2024-01-01 10:00:00").unwrap(),
            key: "-Nk1".to_string(),
        };
        assert_eq!(
            render_report(&item),
            "Proximidad • Objeto detectado cerca\n2024-01-01 10:00:00"
        );
    }

    #[test]
    fn test_empty_list_message() {
        assert_eq!(render_reports(&[]), EMPTY_MESSAGE);
    }
}
