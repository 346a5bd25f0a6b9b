//! Per-iteration statistics table.
//!
//! Components register columns at initialization; the driver opens one row
//! per outer iteration and prints it when verbose output is enabled.

use std::collections::BTreeMap;

/// Column width for integer statistics.
pub const INT_WIDTH: usize = 7;
/// Column width for floating-point statistics.
pub const DOUBLE_WIDTH: usize = 15;

struct Column {
    name: String,
    width: usize,
}

/// Tabular iteration log.
pub struct Statistics {
    columns: Vec<Column>,
    current_row: BTreeMap<String, String>,
    verbose: bool,
    lines_printed: usize,
}

impl Statistics {
    /// New empty table; rows are printed to stdout iff `verbose`.
    pub fn new(verbose: bool) -> Self {
        Statistics {
            columns: Vec::new(),
            current_row: BTreeMap::new(),
            verbose,
            lines_printed: 0,
        }
    }

    /// Register a column. Registration order is display order.
    pub fn add_column(&mut self, name: &str, width: usize) {
        if !self.columns.iter().any(|c| c.name == name) {
            self.columns.push(Column { name: name.to_string(), width });
        }
    }

    /// Record an integer statistic in the current row.
    pub fn add_integer(&mut self, name: &str, value: usize) {
        self.current_row.insert(name.to_string(), value.to_string());
    }

    /// Record a floating-point statistic in the current row.
    pub fn add_double(&mut self, name: &str, value: f64) {
        self.current_row.insert(name.to_string(), format!("{value:.4e}"));
    }

    /// Record a raw string statistic in the current row.
    pub fn add_string(&mut self, name: &str, value: &str) {
        self.current_row.insert(name.to_string(), value.to_string());
    }

    /// Start a new row.
    pub fn new_line(&mut self) {
        self.current_row.clear();
    }

    /// Print the current row (and a header every 20 lines).
    pub fn print_current_line(&mut self) {
        if !self.verbose {
            return;
        }
        if self.lines_printed % 20 == 0 {
            let header: Vec<String> = self
                .columns
                .iter()
                .map(|c| format!("{:>width$}", c.name, width = c.width))
                .collect();
            println!("{}", header.join(" "));
        }
        let row: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let value = self.current_row.get(&c.name).map(String::as_str).unwrap_or("-");
                format!("{value:>width$}", width = c.width)
            })
            .collect();
        println!("{}", row.join(" "));
        self.lines_printed += 1;
    }

    /// Whether verbose output is enabled.
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_register_once() {
        let mut statistics = Statistics::new(false);
        statistics.add_column("major", INT_WIDTH);
        statistics.add_column("major", INT_WIDTH);
        statistics.add_column("objective", DOUBLE_WIDTH);
        assert_eq!(statistics.columns.len(), 2);
    }

    #[test]
    fn rows_reset() {
        let mut statistics = Statistics::new(false);
        statistics.add_column("major", INT_WIDTH);
        statistics.add_integer("major", 3);
        assert_eq!(statistics.current_row.len(), 1);
        statistics.new_line();
        assert!(statistics.current_row.is_empty());
    }
}
