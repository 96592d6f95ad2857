mod parser;

use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::fmt;
use std::io::Read;
use std::path::Path;

use parser::RawRow;

/// Column names probed, in priority order, for the abandonment flag.
const ABANDON_COLUMNS: [&str; 3] = ["is_abandoned", "abandoned_flag", "abandoned"];
/// Column names probed, in priority order, for the 7-day repeat-contact flag.
const REPEAT_COLUMNS: [&str; 3] = ["repeat_call_7d", "repeat_7d", "is_repeat_7d"];

/// One prepared interaction. String fields are trimmed, flags are normalized
/// to booleans, and `handle_secs` is derived once at load time.
#[derive(Debug, Clone)]
pub struct InteractionRecord {
    pub interaction_id: Option<String>,
    pub started_at: Option<NaiveDateTime>,
    pub queue_skill: String,
    pub channel: String,
    pub talk_secs: Option<f64>,
    pub hold_secs: Option<f64>,
    pub wrap_secs: Option<f64>,
    pub agent_id: Option<String>,
    pub transfer: Option<bool>,
    pub resolved: Option<bool>,
    pub fcr: Option<bool>,
    pub abandoned: Option<bool>,
    pub customer_id: Option<String>,
    pub logged_secs: Option<f64>,
    pub csat: Option<f64>,
    pub nps: Option<f64>,
    pub ces: Option<f64>,
    pub repeat_within_7d: Option<bool>,
    /// Record-quality tag, uppercased ("VALID", "NOISE", "ZOMBIE", ...).
    pub record_status: Option<String>,
    /// talk + hold + wrap-up, missing components as zero.
    pub handle_secs: f64,
    /// Explicit `aht` column when present, otherwise `handle_secs`.
    pub aht_secs: Option<f64>,
    /// True when the record counts toward variability statistics.
    pub valid: bool,
}

/// The in-memory interaction table: prepared records plus the set of source
/// columns the CSV header actually carried. Optional columns degrade through
/// the header set; required columns are validated per dimension.
#[derive(Debug, Clone)]
pub struct InteractionFrame {
    records: Vec<InteractionRecord>,
    columns: BTreeSet<String>,
}

impl InteractionFrame {
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, csv::Error> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns: BTreeSet<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let abandon_column = ABANDON_COLUMNS
            .iter()
            .copied()
            .find(|c| columns.contains(*c));
        let repeat_column = REPEAT_COLUMNS
            .iter()
            .copied()
            .find(|c| columns.contains(*c));
        let has_status = columns.contains("record_status");
        let has_aht = columns.contains("aht");

        let mut records = Vec::new();
        for row in csv_reader.deserialize::<RawRow>() {
            let row = row?;
            records.push(prepare_record(
                row,
                abandon_column,
                repeat_column,
                has_status,
                has_aht,
            ));
        }

        Ok(Self { records, columns })
    }

    pub fn records(&self) -> &[InteractionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    /// Which of the probed abandonment columns the header carried, if any.
    pub fn abandonment_column(&self) -> Option<&'static str> {
        ABANDON_COLUMNS
            .iter()
            .copied()
            .find(|c| self.columns.contains(*c))
    }

    /// Which of the probed repeat-contact columns the header carried, if any.
    pub fn repeat_column(&self) -> Option<&'static str> {
        REPEAT_COLUMNS
            .iter()
            .copied()
            .find(|c| self.columns.contains(*c))
    }

    /// True when the header carried either customer identity column.
    pub fn has_customer_identity(&self) -> bool {
        self.columns.contains("customer_id") || self.columns.contains("caller_id")
    }

    /// Every required column missing from the header, in the order given.
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|c| !self.columns.contains(**c))
            .map(|c| c.to_string())
            .collect()
    }

    /// Fail-fast validation used by dimension constructors.
    pub fn require_columns(
        &self,
        dimension: &'static str,
        required: &[&str],
    ) -> Result<(), SchemaError> {
        let missing = self.missing_columns(required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SchemaError { dimension, missing })
        }
    }
}

fn prepare_record(
    row: RawRow,
    abandon_column: Option<&'static str>,
    repeat_column: Option<&'static str>,
    has_status: bool,
    has_aht: bool,
) -> InteractionRecord {
    let talk_secs = parser::parse_f64(row.duration_talk.as_deref());
    let hold_secs = parser::parse_f64(row.hold_time.as_deref());
    let wrap_secs = parser::parse_f64(row.wrap_up_time.as_deref());
    let handle_secs =
        talk_secs.unwrap_or(0.0) + hold_secs.unwrap_or(0.0) + wrap_secs.unwrap_or(0.0);

    let abandoned = match abandon_column {
        Some("is_abandoned") => parser::parse_flag(row.is_abandoned.as_deref()),
        Some("abandoned_flag") => parser::parse_flag(row.abandoned_flag.as_deref()),
        Some("abandoned") => parser::parse_flag(row.abandoned.as_deref()),
        _ => None,
    };

    let repeat_within_7d = match repeat_column {
        Some("repeat_call_7d") => parser::parse_flag(row.repeat_call_7d.as_deref()),
        Some("repeat_7d") => parser::parse_flag(row.repeat_7d.as_deref()),
        Some("is_repeat_7d") => parser::parse_flag(row.is_repeat_7d.as_deref()),
        _ => None,
    };

    let customer_id =
        parser::trimmed(row.customer_id.as_deref()).or(parser::trimmed(row.caller_id.as_deref()));

    let record_status = if has_status {
        parser::trimmed(row.record_status.as_deref()).map(|s| s.to_uppercase())
    } else {
        None
    };
    let valid = if has_status {
        record_status.as_deref() == Some("VALID")
    } else {
        true
    };

    let aht_secs = if has_aht {
        parser::parse_f64(row.aht.as_deref())
    } else {
        Some(handle_secs)
    };

    InteractionRecord {
        interaction_id: parser::trimmed(row.interaction_id.as_deref()),
        started_at: parser::parse_datetime(row.datetime_start.as_deref()),
        queue_skill: parser::trimmed(row.queue_skill.as_deref()).unwrap_or_default(),
        channel: parser::trimmed(row.channel.as_deref()).unwrap_or_default(),
        talk_secs,
        hold_secs,
        wrap_secs,
        agent_id: parser::trimmed(row.agent_id.as_deref()),
        transfer: parser::parse_flag(row.transfer_flag.as_deref()),
        resolved: parser::parse_flag(row.is_resolved.as_deref()),
        fcr: parser::parse_flag(row.fcr_real_flag.as_deref()),
        abandoned,
        customer_id,
        logged_secs: parser::parse_f64(row.logged_time.as_deref()),
        csat: parser::parse_f64(row.csat_score.as_deref()),
        nps: parser::parse_f64(row.nps_score.as_deref()),
        ces: parser::parse_f64(row.ces_score.as_deref()),
        repeat_within_7d,
        record_status,
        handle_secs,
        aht_secs,
        valid,
    }
}

/// A required column is absent from the input table. Raised at dimension
/// construction; lists every missing column at once.
#[derive(Debug, Clone)]
pub struct SchemaError {
    pub dimension: &'static str,
    pub missing: Vec<String>,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "missing required columns for {}: {}",
            self.dimension,
            self.missing.join(", ")
        )
    }
}

impl std::error::Error for SchemaError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CSV: &str = "\
interaction_id,datetime_start,queue_skill,channel,duration_talk,hold_time,wrap_up_time,abandoned_flag,caller_id,record_status
id1,2024-01-01 10:00:00, sales ,voice,600,60,30,0,C1,VALID
id2,bad-date,support,chat,400,,20,1,C2,NOISE
";

    #[test]
    fn frame_prepares_records_and_tracks_columns() {
        let frame = InteractionFrame::from_csv_reader(Cursor::new(CSV)).expect("frame parses");
        assert_eq!(frame.len(), 2);
        assert!(frame.has_column("interaction_id"));
        assert!(!frame.has_column("csat_score"));
        assert_eq!(frame.abandonment_column(), Some("abandoned_flag"));
        assert!(frame.has_customer_identity());

        let first = &frame.records()[0];
        assert_eq!(first.queue_skill, "sales");
        assert_eq!(first.handle_secs, 690.0);
        assert_eq!(first.abandoned, Some(false));
        assert_eq!(first.customer_id.as_deref(), Some("C1"));
        assert!(first.valid);

        let second = &frame.records()[1];
        assert!(second.started_at.is_none(), "bad timestamp coerces to none");
        assert_eq!(second.handle_secs, 420.0, "missing hold counts as zero");
        assert_eq!(second.abandoned, Some(true));
        assert!(!second.valid, "noise rows are excluded from valid set");
    }

    #[test]
    fn require_columns_lists_every_missing_column() {
        let frame = InteractionFrame::from_csv_reader(Cursor::new(CSV)).expect("frame parses");
        let err = frame
            .require_columns("volume", &["interaction_id", "agent_id", "transfer_flag"])
            .expect_err("columns are missing");
        assert_eq!(err.missing, vec!["agent_id", "transfer_flag"]);
        assert!(err.to_string().contains("agent_id, transfer_flag"));
    }
}
