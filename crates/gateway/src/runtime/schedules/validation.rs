//! Input validation for schedule fields (cron expressions, timezones).
//!
//! Cron strings are validated at create time (spec §4.H).

/// Validate an IANA timezone string.
pub fn validate_timezone(tz: &str) -> Result<(), String> {
    if tz.parse::<chrono_tz::Tz>().is_err() {
        Err(format!(
            "invalid timezone: '{}' — use IANA names like 'America/New_York' or 'UTC'",
            tz
        ))
    } else {
        Ok(())
    }
}

/// Validate a 5-field cron expression. Returns `Ok(())` or an error message.
pub fn validate_cron(cron: &str) -> Result<(), String> {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!(
            "expected 5 fields (minute hour dom month dow), got {}",
            fields.len()
        ));
    }
    let names = ["minute", "hour", "day-of-month", "month", "day-of-week"];
    let ranges: [(u32, u32); 5] = [(0, 59), (0, 23), (1, 31), (1, 12), (0, 6)];

    for (i, field) in fields.iter().enumerate() {
        validate_cron_field(field, names[i], ranges[i].0, ranges[i].1)?;
    }
    Ok(())
}

fn validate_cron_field(field: &str, name: &str, min: u32, max: u32) -> Result<(), String> {
    if field == "*" {
        return Ok(());
    }
    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step
            .parse()
            .map_err(|_| format!("{}: invalid step '*/{}' — expected a number", name, step))?;
        if n == 0 || n > max {
            return Err(format!("{}: step {} out of range 1..={}", name, n, max));
        }
        return Ok(());
    }
    for part in field.split(',') {
        if let Some((start_s, end_s)) = part.split_once('-') {
            let start: u32 = start_s
                .parse()
                .map_err(|_| format!("{}: invalid range start '{}'", name, start_s))?;
            let end: u32 = end_s
                .parse()
                .map_err(|_| format!("{}: invalid range end '{}'", name, end_s))?;
            if start < min || start > max || end < min || end > max {
                return Err(format!(
                    "{}: range {}-{} out of bounds {}..={}",
                    name, start, end, min, max
                ));
            }
            if start > end {
                return Err(format!("{}: range start {} > end {}", name, start, end));
            }
        } else {
            let n: u32 = part
                .parse()
                .map_err(|_| format!("{}: invalid value '{}'", name, part))?;
            if n < min || n > max {
                return Err(format!(
                    "{}: value {} out of range {}..={}",
                    name, n, min, max
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_cron_accepts_valid() {
        assert!(validate_cron("0 * * * *").is_ok());
        assert!(validate_cron("*/5 9-17 * * 1-5").is_ok());
        assert!(validate_cron("30 9 1,15 * *").is_ok());
        assert!(validate_cron("0 0 * * 0").is_ok());
    }

    #[test]
    fn validate_cron_rejects_invalid() {
        assert!(validate_cron("* * *").is_err());
        assert!(validate_cron("* * * * * *").is_err());
        assert!(validate_cron("60 * * * *").is_err());
        assert!(validate_cron("* 24 * * *").is_err());
        assert!(validate_cron("* * 0 * *").is_err());
        assert!(validate_cron("* * * 13 *").is_err());
        assert!(validate_cron("* * * * 7").is_err());
        assert!(validate_cron("*/0 * * * *").is_err());
        assert!(validate_cron("abc * * * *").is_err());
    }

    #[test]
    fn validate_timezone_accepts_valid() {
        assert!(validate_timezone("UTC").is_ok());
        assert!(validate_timezone("America/New_York").is_ok());
        assert!(validate_timezone("Europe/London").is_ok());
        assert!(validate_timezone("Asia/Tokyo").is_ok());
    }

    #[test]
    fn validate_timezone_rejects_invalid() {
        assert!(validate_timezone("Not/Real").is_err());
        assert!(validate_timezone("").is_err());
        assert!(validate_timezone("GMT+5").is_err());
        assert!(validate_timezone("FakeZone").is_err());
    }
}
