//! Shared handling of the five-field cron grammar.
//!
//! Schedules persist standard five-field cron (min hour dom month dow). The
//! parser wants six fields with a leading seconds column, and it numbers
//! day-of-week 1 (SUN) through 7 (SAT) where the standard grammar uses
//! 0 (SUN) through 6 (SAT), with 7 accepted as Sunday again. Normalization
//! bridges both: a zero seconds field is prepended and numeric day-of-week
//! tokens are shifted. Admission and the scheduling math both go through
//! [`parse_cron`] so they agree on what an expression means.

use std::str::FromStr;

/// Rewrite a five-field expression into the six-field form the parser wants.
/// Anything with a different field count passes through untouched (the
/// validator rejects those before they are ever persisted).
pub fn normalize_cron(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.as_slice() {
        [min, hour, dom, month, dow] => {
            format!("0 {min} {hour} {dom} {month} {}", normalize_dow(dow))
        }
        _ => expr.trim().to_string(),
    }
}

/// Shift numeric day-of-week tokens from the standard 0-7 numbering (0 and 7
/// both Sunday) to the parser's 1 (SUN) through 7 (SAT). Names, wildcards,
/// and step counts pass through untouched.
fn normalize_dow(field: &str) -> String {
    field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let shifted = range
                .split('-')
                .map(|token| match token.parse::<u32>() {
                    Ok(n) if n <= 7 => ((n % 7) + 1).to_string(),
                    _ => token.to_string(),
                })
                .collect::<Vec<_>>()
                .join("-");
            match step {
                Some(step) => format!("{shifted}/{step}"),
                None => shifted,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a standard five-field cron expression.
pub fn parse_cron(expr: &str) -> Result<cron::Schedule, cron::error::Error> {
    cron::Schedule::from_str(&normalize_cron(expr))
}

// ── Tests ───────────────────────────────────────────────────────────
