//! Table layouts and cell coercion shared by the readers and the sink

use std::num::ParseFloatError;

use chrono::NaiveDate;

// Consolidated table ("monitoramento"), also read back as the snapshot
pub const COL_ENTITY_ID: &str = "OS ID";
pub const COL_LOCATION: &str = "Cod Autorizada";
pub const COL_STATUS: &str = "Status OS";
pub const COL_TAT: &str = "TAT";
pub const COL_LAST_SEEN: &str = "Data Última Observação";
pub const COL_STATUS_SINCE: &str = "Início Status";
pub const COL_DAYS_IN_STATUS: &str = "Dias no Status";
pub const COL_TARGET: &str = "Meta";
pub const COL_DAYS_OVER: &str = "Fora do Prazo";
pub const COL_CLOSED: &str = "Encerrada";
pub const COL_MODEL: &str = "Modelo";
pub const COL_SERIAL: &str = "Número de Série";
pub const COL_PART_DELIVERY: &str = "Entrega da Peça";

/// Prefix of the per-status accumulated-days columns
pub const DAYS_IN_PREFIX: &str = "Dias em: ";

// History table
pub const COL_INTERVAL_STATUS: &str = "Status";
pub const COL_INTERVAL_START: &str = "Início";
pub const COL_INTERVAL_END: &str = "Fim";
pub const COL_BUSINESS_DAYS: &str = "Dias Úteis";

// Rankings
pub const COL_ENTITY_COUNT: &str = "Quantidade OS";
pub const COL_TOTAL_DAYS_OVER: &str = "Total Dias Atraso";

pub const YES: &str = "Sim";
pub const NO: &str = "Não";

const DATE_OUT: &str = "%Y-%m-%d";
const DATE_IN: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];

/// Header name of the accumulated-days column for a status
pub fn days_in_column(status: &str) -> String {
    format!("{}{}", DAYS_IN_PREFIX, status)
}

/// Render a date cell
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_OUT).to_string()
}

/// Parse a date cell. Accepts ISO and day-first forms, with or without a
/// trailing time component.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed
        .split(|c: char| c == ' ' || c == 'T')
        .next()
        .unwrap_or(trimmed);

    DATE_IN
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Coerce a day-count cell.
///
/// Empty → `Ok(None)`. Decimal commas are accepted, fractions are rounded and
/// negative values clamp to zero.
pub fn parse_day_count(raw: &str) -> Result<Option<u32>, ParseFloatError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: f64 = trimmed.replace(',', ".").parse()?;
    if value.is_nan() {
        return Ok(Some(0));
    }
    Ok(Some(value.clamp(0.0, f64::from(u32::MAX)).round() as u32))
}

/// Interpret a yes/no cell
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "sim" | "s" | "yes" | "y" | "true" | "1"
    )
}

pub fn format_flag(value: bool) -> &'static str {
    if value {
        YES
    } else {
        NO
    }
}

pub fn format_optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Guess the delimiter of a CSV export from its header line.
///
/// Spreadsheets configured for pt-BR export with `;`.
pub fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// Header lookup by trimmed, case-insensitive name
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    names: Vec<String>,
}

impl HeaderIndex {
    pub fn new(headers: &csv::StringRecord) -> Self {
        Self {
            names: headers
                .iter()
                .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
                .collect(),
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase();
        self.names.iter().position(|h| *h == wanted)
    }

    /// Positions of every header starting with `prefix`, with the remainder
    pub fn with_prefix<'a>(
        &'a self,
        headers: &'a csv::StringRecord,
        prefix: &'a str,
    ) -> impl Iterator<Item = (usize, &'a str)> + 'a {
        let wanted = prefix.to_lowercase();
        self.names
            .iter()
            .enumerate()
            .filter(move |(_, name)| name.starts_with(&wanted))
            .filter_map(move |(idx, _)| {
                headers
                    .get(idx)
                    .map(|h| h.trim().trim_start_matches('\u{feff}'))
                    .and_then(|h| h.get(prefix.len()..))
                    .map(|rest| (idx, rest))
            })
    }
}

/// Cell at `idx`, trimmed, or empty when the row is short
pub fn cell(row: &csv::StringRecord, idx: Option<usize>) -> &str {
    idx.and_then(|i| row.get(i)).map(str::trim).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date_forms() {
        assert_eq!(parse_date("2024-03-04"), Some(date(2024, 3, 4)));
        assert_eq!(parse_date("04/03/2024"), Some(date(2024, 3, 4)));
        assert_eq!(parse_date("2024-03-04 00:00:00"), Some(date(2024, 3, 4)));
        assert_eq!(parse_date("amanhã"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_parse_day_count_coercion() {
        assert_eq!(parse_day_count(""), Ok(None));
        assert_eq!(parse_day_count("4"), Ok(Some(4)));
        assert_eq!(parse_day_count("4.0"), Ok(Some(4)));
        assert_eq!(parse_day_count("2,6"), Ok(Some(3)));
        assert_eq!(parse_day_count("-2"), Ok(Some(0)));
        assert!(parse_day_count("quatro").is_err());
    }

    #[test]
    fn test_flags() {
        assert!(parse_flag("Sim"));
        assert!(parse_flag(" true "));
        assert!(!parse_flag("Não"));
        assert!(!parse_flag(""));
        assert_eq!(format_flag(true), YES);
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("OS ID;Status OS;TAT\n1;A;2"), b';');
        assert_eq!(sniff_delimiter("OS ID,Status OS\n"), b',');
    }

    #[test]
    fn test_header_index_prefix_lookup() {
        let headers = csv::StringRecord::from(vec!["OS ID", "Dias em: REPARO", "dias em: PECA", "Meta"]);
        let index = HeaderIndex::new(&headers);

        assert_eq!(index.position("os id"), Some(0));
        let found: Vec<(usize, &str)> = index.with_prefix(&headers, DAYS_IN_PREFIX).collect();
        assert_eq!(found, vec![(1, "REPARO"), (2, "PECA")]);
    }
}
