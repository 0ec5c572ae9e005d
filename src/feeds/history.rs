use std::path::Path;

use crate::types::Bar;

/// Load 1m bars from a CSV file: timestamp_ms,open,high,low,close,volume.
/// A header row is tolerated; malformed rows are skipped with a count.
pub fn load_bars(path: &Path) -> Result<Vec<Bar>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("read {}: {}", path.display(), e))?;
    parse_bars(&text)
}

pub fn parse_bars(text: &str) -> Result<Vec<Bar>, String> {
    let mut bars = Vec::new();
    let mut skipped = 0usize;

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 6 {
            skipped += 1;
            continue;
        }

        // Header row: first field does not parse as a timestamp
        let ts: i64 = match fields[0].parse() {
            Ok(t) => t,
            Err(_) if lineno == 0 => continue,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };

        let num = |i: usize| fields[i].parse::<f64>().ok();
        let (open, high, low, close, volume) =
            match (num(1), num(2), num(3), num(4), num(5)) {
                (Some(o), Some(h), Some(l), Some(c), Some(v)) => (o, h, l, c, v),
                _ => {
                    skipped += 1;
                    continue;
                }
            };

        if high < low || open <= 0.0 || close <= 0.0 {
            skipped += 1;
            continue;
        }
        bars.push(Bar {
            close_ts_ms: ts,
            open,
            high,
            low,
            close,
            volume,
            closed: true,
        });
    }

    if skipped > 0 {
        eprintln!("[BT] Skipped {} malformed rows", skipped);
    }
    if bars.is_empty() {
        return Err("no usable bars in input".into());
    }
    bars.sort_by_key(|b| b.close_ts_ms);
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_plain_csv() {
        let csv = "\
1710000059999,142.00,143.10,141.90,142.80,1250.5
1710000119999,142.80,142.95,142.10,142.20,890.0
";
        let bars = parse_bars(csv).unwrap();
        assert_eq!(bars.len(), 2);
        assert!((bars[0].close - 142.80).abs() < 1e-9);
        assert!(bars.iter().all(|b| b.closed));
    }

    #[test]
    fn test_skips_header_and_sorts() {
        let csv = "\
timestamp,open,high,low,close,volume
1710000119999,142.80,142.95,142.10,142.20,890.0
1710000059999,142.00,143.10,141.90,142.80,1250.5
";
        let bars = parse_bars(csv).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].close_ts_ms < bars[1].close_ts_ms);
    }

    #[test]
    fn test_skips_bad_rows() {
        // Nothing usable at all
        assert!(parse_bars("").is_err());
        assert!(parse_bars("1710000059999,142.00,143.10").is_err());

        // Bad rows among good ones are dropped, not fatal
        let csv = "\
1710000059999,142.00,143.10,141.90,142.80,1250.5
1710000119999,142.00,141.00,143.00,142.80,10.0
oops,142.00,143.10,141.90,142.80,1250.5
1710000179999,142.80,142.95,142.10,142.20,890.0
";
        let bars = parse_bars(csv).unwrap();
        assert_eq!(bars.len(), 2);
    }
}
