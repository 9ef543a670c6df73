//! Plain-text rendering of app listings for the CLI.
//!
//! ```text
//! Name             Status    PID    Error     Ping
//! ----             ------    ---    -----     ----
//! api              Running   4242             14:03:11
//! worker           Killed           spawn ENOENT
//! ```

use std::fmt::Write;

use crate::dto::AppDto;

const COLUMNS: [(&str, usize); 5] = [("Name", 17), ("Status", 10), ("PID", 7), ("Error", 10), ("Ping", 10)];

/// Renders `apps` as a fixed-width table; `color` wraps names in their ANSI color.
pub fn render(apps: &[AppDto], color: bool) -> String {
    let mut out = String::new();
    let header: Vec<String> = COLUMNS.iter().map(|(h, _)| h.to_string()).collect();
    let rule: Vec<String> = COLUMNS.iter().map(|(h, _)| "-".repeat(h.len())).collect();
    push_row(&mut out, &header, None);
    push_row(&mut out, &rule, None);

    for app in apps {
        let cells = [
            app.name.clone(),
            app.status.to_string(),
            app.pid.map(|p| p.to_string()).unwrap_or_default(),
            app.error.clone().unwrap_or_default(),
            app.last_heartbeat.clone().unwrap_or_default(),
        ];
        push_row(&mut out, &cells, color.then(|| app.color.ansi()));
    }
    out
}

fn push_row(out: &mut String, cells: &[String], ansi: Option<u8>) {
    let mut line = String::new();
    for (i, (cell, (_, width))) in cells.iter().zip(COLUMNS.iter()).enumerate() {
        let padded = format!("{cell:<width$}");
        match ansi {
            Some(code) if i == 0 => {
                let _ = write!(line, "\x1b[{code}m{padded}\x1b[0m");
            }
            _ => line.push_str(&padded),
        }
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AppStatus, ColorTag};
    use crate::dto::AppConfigDto;

    fn dto(name: &str, status: AppStatus, pid: Option<u32>) -> AppDto {
        AppDto {
            name: name.into(),
            status,
            pid,
            error: None,
            port: None,
            last_heartbeat: None,
            color: ColorTag::Green,
            config: AppConfigDto {
                name: name.into(),
                main: "main.js".into(),
                cwd: "/ws".into(),
                args: Vec::new(),
                log: None,
            },
        }
    }

    #[test]
    fn test_columns_are_padded() {
        let text = render(&[dto("api", AppStatus::Running, Some(4242))], false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Name             Status    PID    Error     Ping");
        assert_eq!(lines[1], "----             ------    ---    -----     ----");
        assert_eq!(lines[2], "api              Running   4242");
    }

    #[test]
    fn test_color_wraps_only_the_name() {
        let text = render(&[dto("api", AppStatus::Stopped, None)], true);
        let row = text.lines().nth(2).unwrap();
        assert!(row.starts_with("\x1b[32mapi"));
        assert!(row.ends_with("Stopped"));
    }
}
