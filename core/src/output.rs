//! Decoder for the simulator's standard output.
//!
//! One line per federate, in federate order, each exactly
//! `<startCash>:<endCash>` with two finite decimal numbers and no inner
//! whitespace. Line endings (LF or CRLF) and blank lines are tolerated.
//! Anything else, including too few or too many lines, rejects the whole
//! output; there is no sentinel.

use crate::error::TrialError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CashColumns {
    pub start_cash: Vec<f64>,
    pub end_cash:   Vec<f64>,
}

/// Decode `output`, which must hold exactly `expected_lines` result lines.
pub fn decode_cash_lines(output: &str, expected_lines: usize) -> Result<CashColumns, TrialError> {
    let mut columns = CashColumns::default();
    let mut last_line = 0;

    for (n, line) in output.lines().enumerate() {
        let text = line.trim_end_matches('\r');
        if text.trim().is_empty() {
            continue;
        }
        let (start, end) = decode_line(text).map_err(|reason| TrialError::Parse {
            line: n + 1,
            text: text.to_string(),
            reason,
        })?;
        columns.start_cash.push(start);
        columns.end_cash.push(end);
        last_line = n + 1;
    }

    if columns.start_cash.len() != expected_lines {
        return Err(TrialError::Parse {
            line:   last_line,
            text:   String::new(),
            reason: format!(
                "expected {expected_lines} result lines, simulator produced {}",
                columns.start_cash.len()
            ),
        });
    }
    Ok(columns)
}

fn decode_line(text: &str) -> Result<(f64, f64), String> {
    let mut fields = text.split(':');
    let (Some(start), Some(end), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err("expected exactly two ':'-separated fields".to_string());
    };
    Ok((decode_number(start)?, decode_number(end)?))
}

fn decode_number(field: &str) -> Result<f64, String> {
    let value: f64 = field
        .parse()
        .map_err(|_| format!("'{field}' is not a number"))?;
    if !value.is_finite() {
        return Err(format!("'{field}' is not a finite number"));
    }
    Ok(value)
}
