//! Output and display management

use crate::round::{RoundReport, ServerRecord};
use anyhow::Result;
use protocol::info::InfoValue;

/// Render a report as pretty JSON
pub fn to_json(report: &RoundReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// One console line per server
pub fn format_server(record: &ServerRecord) -> String {
    let field = |key: &str| record.info.get(key).map(InfoValue::to_string);

    format!(
        "[{}] {}:{} {} {} ({}/{}) {}",
        record.tag.as_deref().unwrap_or("?"),
        record.address,
        record.port,
        field("hostname").unwrap_or_else(|| "<unnamed>".to_string()),
        field("gametype").unwrap_or_default(),
        field("numplayers").unwrap_or_else(|| "-".to_string()),
        field("maxplayers").unwrap_or_else(|| "-".to_string()),
        field("mapname").unwrap_or_default(),
    )
    .trim_end()
    .to_string()
}

/// Print a report to stdout
pub fn print_report(report: &RoundReport, json: bool) -> Result<()> {
    if json {
        println!("{}", to_json(report)?);
        return Ok(());
    }

    let now = chrono::Local::now().format("%H:%M:%S");
    for record in &report.servers {
        println!("[{}] {}", now, format_server(record));
    }
    println!(
        "[{}] {} servers, {} players (updated {})",
        now, report.count.servers, report.count.players, report.updated_at
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round::RoundCount;
    use protocol::info;

    fn record(payload: &[u8]) -> ServerRecord {
        ServerRecord {
            address: "10.0.0.1".to_string(),
            port: 2302,
            tag: Some("ce".to_string()),
            info: info::parse(payload),
        }
    }

    #[test]
    fn test_format_server() {
        let line = format_server(&record(
            b"\\hostname\\^1Lag^7Free\\gametype\\CTF\\numplayers\\6\\maxplayers\\16\\mapname\\bloodgulch",
        ));
        assert_eq!(line, "[ce] 10.0.0.1:2302 LagFree CTF (6/16) bloodgulch");
    }

    #[test]
    fn test_format_server_missing_fields() {
        let mut server = record(b"");
        server.tag = None;
        assert_eq!(format_server(&server), "[?] 10.0.0.1:2302 <unnamed>  (-/-)");
    }

    #[test]
    fn test_to_json() {
        let report = RoundReport {
            count: RoundCount { players: 6, servers: 1 },
            updated_at: "Sat, 09 Mar 2024 17:05:00 GMT".to_string(),
            servers: vec![record(b"\\numplayers\\6")],
        };
        let json = to_json(&report).unwrap();
        assert!(json.contains("\"updatedAt\""));
        assert!(json.contains("\"numplayers\": 6"));
    }
}
