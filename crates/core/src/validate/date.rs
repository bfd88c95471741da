use chrono::NaiveDate;
use thiserror::Error;

/// Answers that mean "no date yet"; the move date is optional.
const SKIP_TOKENS: &[&str] = &["pular", "nao sei", "não sei", "ainda nao sei", "depois", "skip"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("`{0}` is not a recognized date format")]
    Unrecognized(String),
    #[error("`{0}` is not a valid calendar date")]
    InvalidCalendarDate(String),
    #[error("move date {0} is in the past")]
    PastDate(NaiveDate),
}

/// Normalizes a human-entered move date.
///
/// Accepts `dd/mm/yyyy` and the dash/dot/space-separated variants, bare
/// `ddmmyyyy`, ISO `yyyy-mm-dd`, and two-digit years. Skip tokens yield
/// `Ok(None)`. Dates before `today` are rejected.
pub fn normalize_move_date(raw: &str, today: NaiveDate) -> Result<Option<NaiveDate>, DateError> {
    let trimmed = raw.trim().to_lowercase();
    if SKIP_TOKENS.contains(&trimmed.as_str()) || trimmed == "date.skip" {
        return Ok(None);
    }

    let (day, month, year) = split_parts(&trimmed)?;
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| DateError::InvalidCalendarDate(raw.trim().to_string()))?;

    if date < today {
        return Err(DateError::PastDate(date));
    }

    Ok(Some(date))
}

fn split_parts(input: &str) -> Result<(u32, u32, i32), DateError> {
    let parts: Vec<&str> =
        input.split(['/', '-', '.', ' ']).filter(|part| !part.is_empty()).collect();

    let (first, second, third) = match parts.as_slice() {
        [single] if single.len() == 8 && single.chars().all(|c| c.is_ascii_digit()) => {
            (&single[0..2], &single[2..4], &single[4..8])
        }
        [a, b, c] => (*a, *b, *c),
        _ => return Err(DateError::Unrecognized(input.to_string())),
    };

    let numbers = [first, second, third]
        .iter()
        .map(|part| part.parse::<i32>().map_err(|_| DateError::Unrecognized(input.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    // Four digits up front means ISO ordering; otherwise day-first.
    let (day, month, year) = if first.len() == 4 {
        (numbers[2], numbers[1], numbers[0])
    } else {
        (numbers[0], numbers[1], numbers[2])
    };

    let year = if (0..100).contains(&year) { year + 2000 } else { year };
    let day = u32::try_from(day).map_err(|_| DateError::Unrecognized(input.to_string()))?;
    let month = u32::try_from(month).map_err(|_| DateError::Unrecognized(input.to_string()))?;

    Ok((day, month, year))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{normalize_move_date, DateError};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).expect("valid fixture date")
    }

    #[test]
    fn accepts_common_separators() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 10);
        assert_eq!(normalize_move_date("10/03/2025", today()).expect("valid"), expected);
        assert_eq!(normalize_move_date("10-03-2025", today()).expect("valid"), expected);
        assert_eq!(normalize_move_date("10.03.2025", today()).expect("valid"), expected);
        assert_eq!(normalize_move_date("10 03 2025", today()).expect("valid"), expected);
    }

    #[test]
    fn accepts_compact_and_iso_forms() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 10);
        assert_eq!(normalize_move_date("10032025", today()).expect("valid"), expected);
        assert_eq!(normalize_move_date("2025-03-10", today()).expect("valid"), expected);
    }

    #[test]
    fn two_digit_year_resolves_to_current_century() {
        assert_eq!(
            normalize_move_date("10/03/25", today()).expect("valid"),
            NaiveDate::from_ymd_opt(2025, 3, 10)
        );
    }

    #[test]
    fn skip_token_yields_none() {
        assert_eq!(normalize_move_date("pular", today()).expect("skip"), None);
        assert_eq!(normalize_move_date("  Não sei ", today()).expect("skip"), None);
    }

    #[test]
    fn impossible_calendar_date_is_rejected() {
        assert!(matches!(
            normalize_move_date("31/02/2025", today()),
            Err(DateError::InvalidCalendarDate(_))
        ));
        assert!(matches!(
            normalize_move_date("31/04/2025", today()),
            Err(DateError::InvalidCalendarDate(_))
        ));
    }

    #[test]
    fn past_date_is_rejected() {
        assert!(matches!(
            normalize_move_date("01/01/2025", today()),
            Err(DateError::PastDate(_))
        ));
    }

    #[test]
    fn today_is_allowed() {
        assert_eq!(normalize_move_date("15/01/2025", today()).expect("valid"), Some(today()));
    }

    #[test]
    fn nonsense_is_unrecognized() {
        assert!(matches!(
            normalize_move_date("semana que vem", today()),
            Err(DateError::Unrecognized(_))
        ));
    }
}
