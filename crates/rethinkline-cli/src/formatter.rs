use colored::Colorize;
use rethinkline_core::Term;
use serde_json::Value;

pub struct Formatter {
    format: OutputFormat,
    color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Line,
}

impl Formatter {
    pub fn new(format: &str, color: bool) -> Self {
        let format = match format.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            "line" => OutputFormat::Line,
            _ => OutputFormat::JsonPretty,
        };

        Self { format, color }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// 计划输出: JSON 格式下输出序列化的计划,否则输出缩进的计划树与 ReQL
    pub fn render_plan(&self, plan: &Term) -> serde_json::Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string(plan),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(plan),
            OutputFormat::Table | OutputFormat::Line => {
                let reql = if self.color {
                    plan.to_reql().dimmed().to_string()
                } else {
                    plan.to_reql()
                };
                Ok(format!("{}\n\n{}", plan, reql))
            }
        }
    }

    pub fn render_rows(&self, rows: &[Value]) -> serde_json::Result<String> {
        if rows.is_empty() && matches!(self.format, OutputFormat::Table | OutputFormat::Line) {
            let msg = "No documents found.";
            return Ok(if self.color { msg.dimmed().to_string() } else { msg.to_string() });
        }

        match self.format {
            OutputFormat::Json => serde_json::to_string(rows),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(rows),
            OutputFormat::Table => Ok(self.render_table(rows)),
            OutputFormat::Line => Ok(self.render_line(rows)),
        }
    }

    pub fn print_error(&self, message: &str) {
        if self.color {
            eprintln!("{} {}", "Error:".red().bold(), message);
        } else {
            eprintln!("Error: {}", message);
        }
    }

    fn render_table(&self, rows: &[Value]) -> String {
        let mut columns: Vec<String> = Vec::new();
        for row in rows {
            if let Value::Object(map) = row {
                for key in map.keys() {
                    if !columns.contains(key) {
                        columns.push(key.clone());
                    }
                }
            }
        }

        let cells: Vec<Vec<String>> = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|col| row.get(col).map(format_value).unwrap_or_default())
                    .collect()
            })
            .collect();

        let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let separator: String = widths
            .iter()
            .map(|w| "-".repeat(*w + 2))
            .collect::<Vec<_>>()
            .join("+");

        let header: String = columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| {
                let padded = format!(" {:width$} ", c, width = *w);
                if self.color {
                    padded.cyan().bold().to_string()
                } else {
                    padded
                }
            })
            .collect::<Vec<_>>()
            .join("|");

        let mut out = Vec::with_capacity(cells.len() + 4);
        out.push(format!("+{}+", separator));
        out.push(format!("|{}|", header));
        out.push(format!("+{}+", separator));
        for row in &cells {
            let line: String = row
                .iter()
                .zip(&widths)
                .map(|(cell, w)| format!(" {:width$} ", cell, width = *w))
                .collect::<Vec<_>>()
                .join("|");
            out.push(format!("|{}|", line));
        }
        out.push(format!("+{}+", separator));
        out.join("\n")
    }

    fn render_line(&self, rows: &[Value]) -> String {
        let mut out = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                out.push("-".repeat(40));
            }
            if let Value::Object(map) = row {
                for (key, value) in map {
                    let key = if self.color { key.cyan().to_string() } else { key.clone() };
                    out.push(format!("{}: {}", key, format_value(value)));
                }
            }
        }
        out.join("\n")
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let items: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", items.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_layout() {
        let formatter = Formatter::new("table", false);
        let out = formatter
            .render_rows(&[json!({"id": 1, "name": "miku"}), json!({"id": 22, "tags": ["a"]})])
            .unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "+----+------+------+");
        assert_eq!(lines[1], "| id | name | tags |");
        assert_eq!(lines[3], "| 1  | miku |      |");
        assert_eq!(lines[4], "| 22 |      | [a]  |");
    }

    #[test]
    fn test_json_formats() {
        let rows = [json!({"id": 1})];
        assert_eq!(Formatter::new("json", false).render_rows(&rows).unwrap(), r#"[{"id":1}]"#);
        assert_eq!(Formatter::new("whatever", false).format(), OutputFormat::JsonPretty);
    }

    #[test]
    fn test_plan_tree() {
        let plan = Term::table("users");
        let out = Formatter::new("table", false).render_plan(&plan).unwrap();
        assert_eq!(out, "Table(users)\n\nr.table(\"users\")");
    }

    #[test]
    fn test_empty_rows() {
        let out = Formatter::new("table", false).render_rows(&[]).unwrap();
        assert_eq!(out, "No documents found.");
        assert_eq!(Formatter::new("json", false).render_rows(&[]).unwrap(), "[]");
    }
}
