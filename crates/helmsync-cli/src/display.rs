//! Display formatting for CLI output

use console::style;
use std::fmt::Write;

use helmsync_core::{Containers, Service, StatusSource};
use helmsync_kube::{ActionOutcome, SyncReport};

const HEADERS: [&str; 4] = ["SERVICE", "ADDRESS", "STATUS", "CONTAINERS"];

/// Render services as a table sorted by ID
pub fn services_table(services: &[Service]) -> String {
    let mut sorted: Vec<&Service> = services.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let rows: Vec<[String; 4]> = sorted
        .iter()
        .map(|s| {
            [
                s.id.to_string(),
                if s.address.is_empty() {
                    "-".to_string()
                } else {
                    s.address.clone()
                },
                s.status.to_string(),
                containers_cell(&s.containers),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<w0$}  {:<w1$}  {:<w2$}  {}",
        style(HEADERS[0]).bold(),
        style(HEADERS[1]).bold(),
        style(HEADERS[2]).bold(),
        style(HEADERS[3]).bold(),
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
    );

    for (service, row) in sorted.iter().zip(&rows) {
        let status = match service.status.source() {
            StatusSource::Cluster if service.status.value() == "ready" => style(&row[2]).green(),
            StatusSource::Cluster => style(&row[2]).yellow(),
            StatusSource::Release => style(&row[2]),
        };
        let containers = match service.containers {
            Containers::Known { .. } => style(&row[3]),
            Containers::Unknown { .. } => style(&row[3]).dim(),
        };
        let _ = writeln!(
            out,
            "{:<w0$}  {:<w1$}  {:<w2$}  {}",
            row[0],
            row[1],
            status,
            containers,
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
        );
    }

    out
}

fn containers_cell(containers: &Containers) -> String {
    match containers {
        Containers::Known { containers } if containers.is_empty() => "-".to_string(),
        Containers::Known { containers } => containers
            .iter()
            .map(|c| format!("{}={}", c.name, c.image))
            .collect::<Vec<_>>()
            .join(", "),
        Containers::Unknown { excuse } => format!("unknown: {}", excuse),
    }
}

/// Print one line per applied action and a summary
pub fn print_sync_report(report: &SyncReport) {
    for action in &report.actions {
        let outcome = match action.outcome {
            ActionOutcome::Created => style(action.outcome.to_string()).green(),
            ActionOutcome::Updated => style(action.outcome.to_string()).cyan(),
            ActionOutcome::Deleted => style(action.outcome.to_string()).yellow(),
            ActionOutcome::Absent => style(action.outcome.to_string()).dim(),
        };
        println!(
            "  [{}] {} {} {}",
            action.index, action.kind, action.resource_id, outcome
        );
    }

    println!(
        "{} Applied {} action(s): {} created, {} updated, {} deleted, {} absent",
        style("✓").green().bold(),
        report.actions.len(),
        report.count(ActionOutcome::Created),
        report.count(ActionOutcome::Updated),
        report.count(ActionOutcome::Deleted),
        report.count(ActionOutcome::Absent),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmsync_core::{ContainerSpec, ResourceId, ServiceStatus};

    fn service(id: &str, address: &str, status: ServiceStatus, containers: Containers) -> Service {
        Service {
            id: id.parse::<ResourceId>().unwrap(),
            address: address.to_string(),
            status,
            containers,
            declared_images: Vec::new(),
        }
    }

    #[test]
    fn test_services_table() {
        console::set_colors_enabled(false);

        let services = vec![
            service(
                "monitoring/promop-prometheus",
                "10.0.3.17",
                ServiceStatus::Cluster("ready".to_string()),
                Containers::known(vec![
                    ContainerSpec::new("prometheus", "quay.io/prometheus/prometheus:v2.0.0"),
                    ContainerSpec::new("reloader", "jimmidyson/configmap-reload:v0.1"),
                ]),
            ),
            service(
                "default/web-nginx",
                "",
                ServiceStatus::Release("DEPLOYED".to_string()),
                Containers::unknown("the helm CLI does not expose release manifests"),
            ),
            service(
                "default/api-backend",
                "10.0.0.9",
                ServiceStatus::Cluster("updating".to_string()),
                Containers::known(Vec::new()),
            ),
        ];

        insta::assert_snapshot!(services_table(&services));
    }

    #[test]
    fn test_services_table_empty() {
        console::set_colors_enabled(false);
        let table = services_table(&[]);
        assert_eq!(table.lines().count(), 1);
        assert!(table.starts_with("SERVICE"));
    }
}
