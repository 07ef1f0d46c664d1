//! Trip calendar domain library.
//! A trip file is a small line-oriented text format: directive lines, day
//! markers, and indented activity lines. The core pipeline parses that text
//! into a sparse event map, resolves a week/month-aligned calendar range, and
//! fills every day in the range with location, transition, idle, and activity
//! data plus deterministic color assignment.

pub mod core {
    use chrono::{Datelike, Days, NaiveDate};
    use serde::{Deserialize, Serialize};
    use std::{collections::BTreeMap, fmt, path::PathBuf};
    use uuid::Uuid;

    /* ------------------------------- IDs ------------------------------- */

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct TripId(pub Uuid);

    impl TripId {
        pub fn new() -> Self {
            Self(Uuid::new_v4())
        }
    }

    impl Default for TripId {
        fn default() -> Self {
            Self::new()
        }
    }

    /* ------------------------------- DayId ------------------------------- */

    /// Identifier for one calendar date.
    ///
    /// A plain calendar value with total ordering and equality; day arithmetic
    /// is pure calendar arithmetic, so there is no time-of-day anchor and no
    /// DST drift to guard against.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct DayId(NaiveDate);

    impl DayId {
        pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
            NaiveDate::from_ymd_opt(year, month, day).map(Self)
        }

        pub fn from_date(date: NaiveDate) -> Self {
            Self(date)
        }

        pub fn date(&self) -> NaiveDate {
            self.0
        }

        pub fn year(&self) -> i32 {
            self.0.year()
        }

        pub fn month(&self) -> u32 {
            self.0.month()
        }

        pub fn day(&self) -> u32 {
            self.0.day()
        }

        /// The next calendar day.
        pub fn succ(&self) -> Self {
            Self(self.0.succ_opt().expect("calendar range overflow"))
        }

        pub fn plus_days(&self, n: u64) -> Self {
            Self(
                self.0
                    .checked_add_days(Days::new(n))
                    .expect("calendar range overflow"),
            )
        }

        /// The Sunday on or before this day.
        pub fn prev_sunday(&self) -> Self {
            let back = self.0.weekday().num_days_from_sunday() as u64;
            Self(
                self.0
                    .checked_sub_days(Days::new(back))
                    .expect("calendar range underflow"),
            )
        }

        /// The last calendar day of this day's month.
        pub fn month_end(&self) -> Self {
            let (y, m) = (self.0.year(), self.0.month());
            let first_of_next = if m == 12 {
                NaiveDate::from_ymd_opt(y + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(y, m + 1, 1)
            }
            .expect("valid first of month");
            Self(first_of_next.pred_opt().expect("valid month end"))
        }
    }

    impl fmt::Display for DayId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    /* ------------------------------ Events ------------------------------ */

    /// One explicitly declared calendar day.
    ///
    /// Invariant: `prev_location` is `Some` iff `arriving` is true and a
    /// transition actually occurred (a previous location was known and
    /// differs from the new one).
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DayEvent {
        pub arriving: bool,
        pub location: Option<String>,
        pub prev_location: Option<String>,
        #[serde(default)]
        pub activities: Vec<String>,
    }

    impl DayEvent {
        /// A non-arriving event carrying the given location forward.
        pub fn carry_forward(location: Option<String>) -> Self {
            Self {
                arriving: false,
                location,
                prev_location: None,
                activities: vec![],
            }
        }
    }

    /* ----------------------------- Aggregate ----------------------------- */

    /// Aggregate root: one parsed trip file.
    ///
    /// Build-once: the parser produces it line by line, and nothing mutates it
    /// after the parse completes.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TripFile {
        pub id: TripId,
        /// Optional filesystem path if the trip originates from disk.
        pub path: Option<PathBuf>,

        /// Display title from the `title` directive (falls back to the name).
        pub title: String,

        /// Explicit range boundaries from `start`/`end` directives.
        pub start: Option<DayId>,
        pub end: Option<DayId>,

        /// Sparse event map keyed by calendar day.
        #[serde(default)]
        pub events: BTreeMap<DayId, DayEvent>,

        /// Ordered, deduplicated sequence of arrival locations, for building
        /// external map links.
        #[serde(default)]
        pub route_stops: Vec<String>,

        /// Ordered warnings collected during parsing (line numbers included).
        #[serde(default)]
        pub warnings: Vec<String>,
    }

    impl TripFile {
        pub fn new(path: Option<PathBuf>, title: String) -> Self {
            Self {
                id: TripId::new(),
                path,
                title,
                start: None,
                end: None,
                events: BTreeMap::new(),
                route_stops: vec![],
                warnings: vec![],
            }
        }

        pub fn first_event_day(&self) -> Option<DayId> {
            self.events.keys().next().copied()
        }

        pub fn last_event_day(&self) -> Option<DayId> {
            self.events.keys().next_back().copied()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn succ_is_one_calendar_day() {
            let d = DayId::from_ymd(2026, 1, 31).unwrap();
            assert_eq!(d.succ(), DayId::from_ymd(2026, 2, 1).unwrap());
        }

        #[test]
        fn succ_crosses_years() {
            let d = DayId::from_ymd(2025, 12, 31).unwrap();
            assert_eq!(d.succ(), DayId::from_ymd(2026, 1, 1).unwrap());
        }

        #[test]
        fn prev_sunday_rounds_back() {
            // 2026-03-05 is a Thursday; the preceding Sunday is 2026-03-01.
            let thu = DayId::from_ymd(2026, 3, 5).unwrap();
            assert_eq!(thu.prev_sunday(), DayId::from_ymd(2026, 3, 1).unwrap());
        }

        #[test]
        fn prev_sunday_is_identity_on_sundays() {
            let sun = DayId::from_ymd(2026, 3, 1).unwrap();
            assert_eq!(sun.prev_sunday(), sun);
        }

        #[test]
        fn month_end_handles_february_and_december() {
            let feb = DayId::from_ymd(2024, 2, 10).unwrap();
            assert_eq!(feb.month_end(), DayId::from_ymd(2024, 2, 29).unwrap());
            let dec = DayId::from_ymd(2026, 12, 1).unwrap();
            assert_eq!(dec.month_end(), DayId::from_ymd(2026, 12, 31).unwrap());
        }

        #[test]
        fn day_id_normalization_is_idempotent() {
            let d = DayId::from_ymd(2026, 7, 4).unwrap();
            let again = DayId::from_ymd(d.year(), d.month(), d.day()).unwrap();
            assert_eq!(d, again);
        }
    }
}

pub mod parser {
    //! Line classifier and trip parser.
    //!
    //! The scan is line-oriented: each raw line is classified as a directive,
    //! a day marker (absolute date token or `+` increment), an indented
    //! activity line, or unrecognized. Sequential parse state (`current_day`,
    //! `current_location`) is threaded through an explicit struct, one line at
    //! a time, in file order. Token-level pieces (date tokens, directive
    //! keywords) are `nom` combinators.

    use crate::core::{DayEvent, DayId, TripFile};
    use crate::storage::TripSource;
    use anyhow::{Context, Result};
    use nom::{
        IResult,
        branch::alt,
        bytes::complete::{tag_no_case, take_while_m_n},
        character::complete::space1,
        combinator::{all_consuming, eof, map, map_opt, map_res, rest},
        error::VerboseError,
        sequence::{pair, preceded},
    };
    use std::{
        fs,
        path::{Path, PathBuf},
    };

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    /* ------------------------ Public entry points ------------------------ */

    /// Parse a trip document from a string. Never fails: malformed input
    /// degrades to warnings plus a best-effort result.
    pub fn parse_trip_from_str(
        path: Option<PathBuf>,
        fallback_title: &str,
        input: &str,
    ) -> TripFile {
        let mut trip = TripFile::new(path, fallback_title.to_string());
        let mut state = ParseState::default();
        for (idx, raw) in input.lines().enumerate() {
            parse_line(&mut trip, &mut state, idx + 1, raw);
        }
        trip
    }

    /// Concrete parser implementing the `storage::TripSource` trait.
    pub struct TripParser;

    impl TripSource for TripParser {
        fn parse_trip(&self, abs_path: &Path) -> Result<TripFile> {
            let text =
                fs::read_to_string(abs_path).with_context(|| format!("reading {:?}", abs_path))?;
            let fallback = abs_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("trip");
            Ok(parse_trip_from_str(
                Some(abs_path.to_path_buf()),
                fallback,
                &text,
            ))
        }
    }

    /* ---------------------------- Parse state ---------------------------- */

    /// Sequential state carried across lines.
    #[derive(Debug, Default)]
    struct ParseState {
        current_day: Option<DayId>,
        current_location: Option<String>,
    }

    /* --------------------------- Date tokens --------------------------- */

    /// Resolve a token like `5mar26` or `17aug2027` to a `DayId`.
    ///
    /// 1-2 digit day, case-insensitive 3-letter month abbreviation, 2 or 4
    /// digit year. Two-digit years are prefixed with `20` (so `99` is 2099;
    /// there is deliberately no century-rollover logic). Anything malformed,
    /// including out-of-range day numbers, yields `None` — callers treat that
    /// as "not a date token".
    pub fn resolve_date_token(token: &str) -> Option<DayId> {
        match all_consuming(date_token)(token) {
            Ok((_, day)) => Some(day),
            Err(_) => None,
        }
    }

    fn date_token(i: &str) -> PResult<'_, DayId> {
        let digit = |c: char| c.is_ascii_digit();
        let (i, day) = map_res(take_while_m_n(1, 2, digit), |s: &str| s.parse::<u32>())(i)?;
        let (i, month) = map_opt(
            take_while_m_n(3, 3, |c: char| c.is_ascii_alphabetic()),
            month_number,
        )(i)?;
        let (i, day_id) = map_opt(
            alt((take_while_m_n(4, 4, digit), take_while_m_n(2, 2, digit))),
            move |year_str: &str| {
                let year: i32 = year_str.parse().ok()?;
                let year = if year_str.len() == 2 { 2000 + year } else { year };
                DayId::from_ymd(year, month, day)
            },
        )(i)?;
        Ok((i, day_id))
    }

    fn month_number(abbr: &str) -> Option<u32> {
        match abbr.to_ascii_lowercase().as_str() {
            "jan" => Some(1),
            "feb" => Some(2),
            "mar" => Some(3),
            "apr" => Some(4),
            "may" => Some(5),
            "jun" => Some(6),
            "jul" => Some(7),
            "aug" => Some(8),
            "sep" => Some(9),
            "oct" => Some(10),
            "nov" => Some(11),
            "dec" => Some(12),
            _ => None,
        }
    }

    /* ---------------------------- Directives ---------------------------- */

    #[derive(Debug, PartialEq, Eq)]
    enum Directive<'a> {
        Start(&'a str),
        End(&'a str),
        Title(&'a str),
    }

    fn directive(i: &str) -> PResult<'_, Directive<'_>> {
        alt((
            map(
                preceded(pair(tag_no_case("start"), space1), rest),
                Directive::Start,
            ),
            map(
                preceded(pair(tag_no_case("end"), space1), rest),
                Directive::End,
            ),
            map(
                preceded(pair(tag_no_case("title"), space1), rest),
                Directive::Title,
            ),
        ))(i)
    }

    /// Optional leading `arriving` keyword; returns the remaining location
    /// text, trimmed.
    fn strip_arriving(text: &str) -> (bool, &str) {
        let t = text.trim();
        match arriving_prefix(t) {
            Ok((loc, _)) => (true, loc.trim()),
            Err(_) => (false, t),
        }
    }

    // The keyword must be a whole word: a space or end of input follows it.
    fn arriving_prefix(i: &str) -> PResult<'_, ()> {
        map(pair(tag_no_case("arriving"), alt((space1, eof))), |_| ())(i)
    }

    fn split_first_token(line: &str) -> (&str, &str) {
        match line.split_once(char::is_whitespace) {
            Some((tok, remainder)) => (tok, remainder.trim()),
            None => (line, ""),
        }
    }

    /* ---------------------------- Line fold ---------------------------- */

    fn parse_line(trip: &mut TripFile, state: &mut ParseState, lineno: usize, raw: &str) {
        if raw.trim().is_empty() {
            return;
        }

        // Indented lines attach to the current day as activities. A line with
        // no current day yet has no event to attach to and is dropped.
        if raw.starts_with(' ') || raw.starts_with('\t') {
            if let Some(day) = state.current_day {
                let event = trip
                    .events
                    .entry(day)
                    .or_insert_with(|| DayEvent::carry_forward(state.current_location.clone()));
                event.activities.push(raw.trim().to_string());
            }
            return;
        }

        let line = raw.trim_end();

        if let Ok((_, d)) = directive(line) {
            apply_directive(trip, lineno, d);
            return;
        }

        let (token, remainder) = split_first_token(line);

        if token == "+" {
            handle_increment(trip, state, remainder);
            return;
        }

        if let Some(day) = resolve_date_token(token) {
            handle_date_line(trip, state, day, remainder);
            return;
        }

        trip.warnings
            .push(format!("line {lineno}: unrecognized line: {line:?}"));
    }

    fn apply_directive(trip: &mut TripFile, lineno: usize, d: Directive<'_>) {
        match d {
            Directive::Start(text) => {
                let (token, _) = split_first_token(text.trim());
                match resolve_date_token(token) {
                    Some(day) => trip.start = Some(day),
                    None => trip.warnings.push(format!(
                        "line {lineno}: unparseable date {token:?} in start directive"
                    )),
                }
            }
            Directive::End(text) => {
                let (token, _) = split_first_token(text.trim());
                match resolve_date_token(token) {
                    Some(day) => trip.end = Some(day),
                    None => trip.warnings.push(format!(
                        "line {lineno}: unparseable date {token:?} in end directive"
                    )),
                }
            }
            Directive::Title(text) => {
                // A title line may begin with a date token, which doubles as
                // the trip start; the remainder is the display title.
                let text = text.trim();
                let (token, remainder) = split_first_token(text);
                match resolve_date_token(token) {
                    Some(day) => {
                        trip.start = Some(day);
                        trip.title = remainder.to_string();
                    }
                    None => trip.title = text.to_string(),
                }
            }
        }
    }

    /// `+` line: advance one calendar day, optionally arriving somewhere new.
    /// A `+` before any date line has nothing to advance and is skipped.
    fn handle_increment(trip: &mut TripFile, state: &mut ParseState, remainder: &str) {
        let Some(current) = state.current_day else {
            return;
        };
        let day = current.succ();
        state.current_day = Some(day);

        let (arriving, location_text) = strip_arriving(remainder);
        if arriving {
            let prev = state.current_location.clone();
            if !location_text.is_empty() {
                state.current_location = Some(location_text.to_string());
            }
            let transition = prev.is_some() && prev != state.current_location;
            record_transition(
                trip,
                prev.as_deref(),
                state.current_location.as_deref(),
            );
            // An increment never overwrites an event already present for
            // the day (unlike absolute date lines).
            trip.events.entry(day).or_insert_with(|| DayEvent {
                arriving: true,
                location: state.current_location.clone(),
                prev_location: if transition { prev } else { None },
                activities: vec![],
            });
        } else {
            if !location_text.is_empty() {
                state.current_location = Some(location_text.to_string());
                note_first_location(trip, state);
            }
            trip.events
                .entry(day)
                .or_insert_with(|| DayEvent::carry_forward(state.current_location.clone()));
        }
    }

    /// Absolute date line: repositions `current_day` independently of any
    /// prior day and records an event, overwriting any earlier entry for the
    /// same day wholesale (last directive wins, activities included).
    fn handle_date_line(trip: &mut TripFile, state: &mut ParseState, day: DayId, remainder: &str) {
        state.current_day = Some(day);

        let (arriving, location_text) = strip_arriving(remainder);
        let prev = state.current_location.clone();
        if !location_text.is_empty() {
            state.current_location = Some(location_text.to_string());
        }

        let transition = arriving && prev.is_some() && prev != state.current_location;
        if arriving {
            record_transition(
                trip,
                prev.as_deref(),
                state.current_location.as_deref(),
            );
        } else if !location_text.is_empty() {
            note_first_location(trip, state);
        }

        trip.events.insert(
            day,
            DayEvent {
                arriving,
                location: state.current_location.clone(),
                prev_location: if transition { prev } else { None },
                activities: vec![],
            },
        );
    }

    /* ------------------------- Route bookkeeping ------------------------- */

    fn push_route_stop(trip: &mut TripFile, location: &str) {
        if trip.route_stops.last().map(String::as_str) != Some(location) {
            trip.route_stops.push(location.to_string());
        }
    }

    /// Arrival: seed the route with the previous location if the list is
    /// still empty, then append the new one (no immediate duplicates).
    fn record_transition(trip: &mut TripFile, prev: Option<&str>, new: Option<&str>) {
        if trip.route_stops.is_empty() {
            if let Some(p) = prev {
                trip.route_stops.push(p.to_string());
            }
        }
        if let Some(n) = new {
            push_route_stop(trip, n);
        }
    }

    /// The first explicit location with no prior transition also counts as a
    /// route stop.
    fn note_first_location(trip: &mut TripFile, state: &ParseState) {
        if trip.route_stops.is_empty() {
            if let Some(loc) = state.current_location.as_deref() {
                trip.route_stops.push(loc.to_string());
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::core::DayId;

        fn parse(input: &str) -> TripFile {
            parse_trip_from_str(None, "fixture", input)
        }

        fn day(y: i32, m: u32, d: u32) -> DayId {
            DayId::from_ymd(y, m, d).unwrap()
        }

        #[test]
        fn date_token_basic_shapes() {
            assert_eq!(resolve_date_token("5mar26"), Some(day(2026, 3, 5)));
            assert_eq!(resolve_date_token("05mar26"), Some(day(2026, 3, 5)));
            assert_eq!(resolve_date_token("17aug2027"), Some(day(2027, 8, 17)));
        }

        #[test]
        fn date_token_month_is_case_insensitive() {
            assert_eq!(resolve_date_token("5MAR26"), Some(day(2026, 3, 5)));
            assert_eq!(resolve_date_token("5Mar26"), Some(day(2026, 3, 5)));
        }

        #[test]
        fn two_digit_years_get_a_20_prefix() {
            // No century rollover: 99 means 2099.
            assert_eq!(resolve_date_token("1jan99"), Some(day(2099, 1, 1)));
        }

        #[test]
        fn date_token_rejects_malformed_input() {
            assert_eq!(resolve_date_token("mar26"), None);
            assert_eq!(resolve_date_token("5xyz26"), None);
            assert_eq!(resolve_date_token("5mar"), None);
            assert_eq!(resolve_date_token("5mar202"), None);
            assert_eq!(resolve_date_token("5mar2026x"), None);
            assert_eq!(resolve_date_token("32jan26"), None);
            assert_eq!(resolve_date_token(""), None);
        }

        #[test]
        fn date_token_resolution_is_idempotent() {
            let d = resolve_date_token("29feb24").unwrap();
            let again =
                resolve_date_token(&format!("{}feb{}", d.day(), d.year())).unwrap();
            assert_eq!(d, again);
        }

        #[test]
        fn worked_example_from_grammar() {
            let trip = parse("title Trip\n1jan26 CityA\n+\n3jan26 arriving CityB\n");
            assert_eq!(trip.title, "Trip");

            let jan1 = trip.events.get(&day(2026, 1, 1)).unwrap();
            assert!(!jan1.arriving);
            assert_eq!(jan1.location.as_deref(), Some("CityA"));

            let jan2 = trip.events.get(&day(2026, 1, 2)).unwrap();
            assert!(!jan2.arriving);
            assert_eq!(jan2.location.as_deref(), Some("CityA"));

            let jan3 = trip.events.get(&day(2026, 1, 3)).unwrap();
            assert!(jan3.arriving);
            assert_eq!(jan3.prev_location.as_deref(), Some("CityA"));
            assert_eq!(jan3.location.as_deref(), Some("CityB"));

            assert_eq!(trip.route_stops, vec!["CityA", "CityB"]);
            assert!(trip.warnings.is_empty());
        }

        #[test]
        fn unrecognized_line_warns_with_line_number_and_keeps_state() {
            let trip = parse("1jan26 CityA\nfoo bar\n+\n");
            assert_eq!(trip.warnings.len(), 1);
            assert!(trip.warnings[0].starts_with("line 2:"), "{:?}", trip.warnings);
            assert!(trip.warnings[0].contains("foo bar"));
            // The `+` after the bad line still advances from Jan 1.
            assert!(trip.events.contains_key(&day(2026, 1, 2)));
        }

        #[test]
        fn redeclaring_a_date_discards_earlier_activities() {
            // Last directive wins for a day; accumulated activities are lost,
            // not merged.
            let trip = parse("5mar26 CityA\n  museum\n  dinner\n5mar26 CityB\n");
            let ev = trip.events.get(&day(2026, 3, 5)).unwrap();
            assert_eq!(ev.location.as_deref(), Some("CityB"));
            assert!(ev.activities.is_empty());
        }

        #[test]
        fn activities_attach_to_current_day() {
            let trip = parse("2feb26 Camp\n  hike the rim\n\tlaundry\n");
            let ev = trip.events.get(&day(2026, 2, 2)).unwrap();
            assert_eq!(ev.activities, vec!["hike the rim", "laundry"]);
        }

        #[test]
        fn activity_synthesizes_carry_forward_event() {
            // `+` moves to Jan 2 but the following `+` moves to Jan 3 before
            // any event is written there; the indented line must create one.
            let trip = parse("1jan26 Camp\n+\n3jan26\n  resupply\n");
            let ev = trip.events.get(&day(2026, 1, 3)).unwrap();
            assert!(!ev.arriving);
            assert_eq!(ev.location.as_deref(), Some("Camp"));
            assert_eq!(ev.activities, vec!["resupply"]);
        }

        #[test]
        fn activity_before_any_date_is_dropped() {
            let trip = parse("  floating note\n1jan26 Camp\n");
            assert_eq!(trip.events.len(), 1);
            assert!(trip.warnings.is_empty());
            assert!(
                trip.events
                    .get(&day(2026, 1, 1))
                    .unwrap()
                    .activities
                    .is_empty()
            );
        }

        #[test]
        fn increment_before_any_date_is_a_no_op() {
            let trip = parse("+\n+\n1jan26 Camp\n");
            assert_eq!(trip.first_event_day(), Some(day(2026, 1, 1)));
            assert_eq!(trip.events.len(), 1);
        }

        #[test]
        fn increment_with_arriving_records_a_transition() {
            let trip = parse("1jan26 CityA\n+ arriving CityB\n");
            let jan2 = trip.events.get(&day(2026, 1, 2)).unwrap();
            assert!(jan2.arriving);
            assert_eq!(jan2.prev_location.as_deref(), Some("CityA"));
            assert_eq!(jan2.location.as_deref(), Some("CityB"));
            assert_eq!(trip.route_stops, vec!["CityA", "CityB"]);
        }

        #[test]
        fn increment_does_not_overwrite_existing_event() {
            // Jan 2 is declared absolutely, then revisited via `1jan26` + `+`.
            let trip = parse("2jan26 CityB\n1jan26 CityA\n+ arriving CityC\n");
            let jan2 = trip.events.get(&day(2026, 1, 2)).unwrap();
            assert_eq!(jan2.location.as_deref(), Some("CityB"));
            assert!(!jan2.arriving);
        }

        #[test]
        fn arriving_keyword_is_case_insensitive() {
            let trip = parse("1jan26 CityA\n3jan26 ARRIVING CityB\n");
            let jan3 = trip.events.get(&day(2026, 1, 3)).unwrap();
            assert!(jan3.arriving);
            assert_eq!(jan3.location.as_deref(), Some("CityB"));
        }

        #[test]
        fn arriving_without_location_keeps_current() {
            let trip = parse("1jan26 CityA\n3jan26 arriving\n");
            let jan3 = trip.events.get(&day(2026, 1, 3)).unwrap();
            assert!(jan3.arriving);
            assert_eq!(jan3.location.as_deref(), Some("CityA"));
            // Same place, so no transition and no prev_location.
            assert_eq!(jan3.prev_location, None);
        }

        #[test]
        fn date_line_without_location_carries_current_forward() {
            let trip = parse("1jan26 CityA\n4jan26\n");
            let jan4 = trip.events.get(&day(2026, 1, 4)).unwrap();
            assert!(!jan4.arriving);
            assert_eq!(jan4.location.as_deref(), Some("CityA"));
        }

        #[test]
        fn start_and_end_directives_set_boundaries() {
            let trip = parse("start 1jan26\nend 15jan26\n5jan26 Camp\n");
            assert_eq!(trip.start, Some(day(2026, 1, 1)));
            assert_eq!(trip.end, Some(day(2026, 1, 15)));
        }

        #[test]
        fn bad_directive_date_warns_and_leaves_field_unset() {
            let trip = parse("start notadate\nend 99zap26\n5jan26 Camp\n");
            assert_eq!(trip.start, None);
            assert_eq!(trip.end, None);
            assert_eq!(trip.warnings.len(), 2);
            assert!(trip.warnings[0].contains("start"));
            assert!(trip.warnings[1].contains("end"));
        }

        #[test]
        fn title_with_leading_date_token_sets_start() {
            let trip = parse("title 1jan26 Winter Loop\n5jan26 Camp\n");
            assert_eq!(trip.start, Some(day(2026, 1, 1)));
            assert_eq!(trip.title, "Winter Loop");
        }

        #[test]
        fn directive_keywords_do_not_swallow_lookalikes() {
            // `endless` is not an `end` directive; it is just unrecognized.
            let trip = parse("endless summer\n1jan26 Camp\n");
            assert_eq!(trip.end, None);
            assert_eq!(trip.warnings.len(), 1);
            assert!(trip.warnings[0].contains("endless"));
        }

        #[test]
        fn route_stops_skip_immediate_duplicates() {
            let trip = parse(
                "1jan26 CityA\n3jan26 arriving CityB\n5jan26 arriving CityB\n7jan26 arriving CityC\n",
            );
            assert_eq!(trip.route_stops, vec!["CityA", "CityB", "CityC"]);
        }

        #[test]
        fn first_arrival_without_prior_location_starts_the_route() {
            let trip = parse("1jan26 arriving CityA\n");
            assert_eq!(trip.route_stops, vec!["CityA"]);
            let ev = trip.events.get(&day(2026, 1, 1)).unwrap();
            assert!(ev.arriving);
            assert_eq!(ev.prev_location, None);
        }
    }
}

pub mod calendar {
    //! Range resolution and day filling: projections built from a parsed
    //! `TripFile`, intended for the rendered calendar grid.

    use crate::core::{DayId, TripFile};
    use indexmap::IndexMap;
    use serde::Serialize;

    /* ------------------------------ Palette ------------------------------ */

    /// Location background colors, assigned in order to each new location
    /// encountered; indices wrap once the palette is exhausted.
    pub const PALETTE: [&str; 15] = [
        "#FFB3BA", // light pink
        "#FFFDB3", // pale yellow
        "#B3F1C8", // mint green
        "#B3EEF1", // powder blue
        "#C4B3F1", // periwinkle
        "#F1B3C4", // pastel rose
        "#FFCBA4", // peach
        "#D4F1E0", // pale seafoam
        "#B3D4F1", // cornflower
        "#E0B3F1", // wisteria
        "#FFE4A6", // pale gold
        "#F1B3E0", // pink lavender
        "#F1D4B3", // pale apricot
        "#E0E0F1", // lavender mist
        "#D4F1B3", // light lime
    ];

    /// Location → palette entry, in strict first-seen order over the emitted
    /// day sequence (chronological, `prev_location` before `location` within
    /// a day).
    #[derive(Debug, Clone, Default, PartialEq, Serialize)]
    pub struct ColorTable {
        colors: IndexMap<String, &'static str>,
        #[serde(skip)]
        next: usize,
    }

    impl ColorTable {
        pub fn assign(&mut self, location: &str) {
            if !self.colors.contains_key(location) {
                let color = PALETTE[self.next % PALETTE.len()];
                self.colors.insert(location.to_string(), color);
                self.next += 1;
            }
        }

        pub fn color_of(&self, location: &str) -> Option<&'static str> {
            self.colors.get(location).copied()
        }

        pub fn iter(&self) -> impl Iterator<Item = (&str, &'static str)> {
            self.colors.iter().map(|(k, v)| (k.as_str(), *v))
        }

        pub fn len(&self) -> usize {
            self.colors.len()
        }

        pub fn is_empty(&self) -> bool {
            self.colors.is_empty()
        }
    }

    /* ------------------------------- Days ------------------------------- */

    /// One rendered calendar day.
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub enum CalendarDay {
        /// Outside the trip's effective span; carries no location data.
        OutOfTrip,
        InTrip(DayCell),
    }

    impl CalendarDay {
        pub fn cell(&self) -> Option<&DayCell> {
            match self {
                CalendarDay::InTrip(cell) => Some(cell),
                CalendarDay::OutOfTrip => None,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct DayCell {
        pub arriving: bool,
        pub location: Option<String>,
        pub prev_location: Option<String>,
        /// True only for filled gap days where a location is already known.
        pub idle: bool,
        pub activities: Vec<String>,
    }

    /* ------------------------------- Range ------------------------------- */

    /// Inclusive calendar range to render, extended to full weeks at the
    /// front and full months at the back.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub struct CalendarRange {
        pub start: DayId,
        pub end: DayId,
    }

    impl CalendarRange {
        pub fn days(&self) -> DayIter {
            DayIter {
                cursor: self.start,
                end: self.end,
                done: false,
            }
        }
    }

    pub struct DayIter {
        cursor: DayId,
        end: DayId,
        done: bool,
    }

    impl Iterator for DayIter {
        type Item = DayId;

        fn next(&mut self) -> Option<DayId> {
            if self.done || self.cursor > self.end {
                self.done = true;
                return None;
            }
            let current = self.cursor;
            if current >= self.end {
                self.done = true;
            } else {
                self.cursor = current.succ();
            }
            Some(current)
        }
    }

    #[derive(Debug, thiserror::Error)]
    pub enum CalendarError {
        /// Terminal for rendering: nothing to display. Surfaced to the user
        /// as a message, never a crash.
        #[error("no dates found in trip file")]
        NoEvents,
    }

    /// Compute the inclusive range to render.
    ///
    /// `start` falls back to the first event day and is rounded back to
    /// Sunday; `end` falls back to 28 days past the last event and is
    /// completed to the end of its month. Inconsistent explicit dates produce
    /// warnings, not failures.
    pub fn resolve_range(trip: &TripFile) -> Result<(CalendarRange, Vec<String>), CalendarError> {
        let first = trip.first_event_day().ok_or(CalendarError::NoEvents)?;
        let last = trip.last_event_day().unwrap_or(first);

        let mut warnings = Vec::new();
        if let (Some(start), Some(end)) = (trip.start, trip.end) {
            if end <= start {
                warnings.push(format!("end date {end} is not after start date {start}"));
            }
        }
        if let Some(end) = trip.end {
            if end < first {
                warnings.push(format!(
                    "end date {end} precedes the first event on {first}"
                ));
            }
        }

        let start = trip.start.unwrap_or(first).prev_sunday();
        let end_anchor = trip.end.unwrap_or_else(|| last.plus_days(28));
        let end = end_anchor.month_end();
        Ok((CalendarRange { start, end }, warnings))
    }

    /* ------------------------------ Filling ------------------------------ */

    /// Dense pipeline output: every day in the resolved range, in order, with
    /// the color table, route stops, and accumulated warnings.
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct Calendar {
        pub title: String,
        pub days: Vec<(DayId, CalendarDay)>,
        pub colors: ColorTable,
        pub route_stops: Vec<String>,
        pub warnings: Vec<String>,
    }

    /// Walk every day of the resolved range, carrying the last known location
    /// into gaps, marking days outside the trip's span, and assigning colors
    /// in emission order.
    pub fn build_calendar(trip: &TripFile) -> Result<Calendar, CalendarError> {
        let (range, range_warnings) = resolve_range(trip)?;
        let first_event = trip.first_event_day().ok_or(CalendarError::NoEvents)?;

        let mut colors = ColorTable::default();
        let mut days = Vec::new();
        let mut running: Option<String> = None;

        for day in range.days() {
            let out_of_trip =
                day < first_event || trip.end.map_or(false, |end| day > end);
            if out_of_trip {
                days.push((day, CalendarDay::OutOfTrip));
                continue;
            }

            let cell = match trip.events.get(&day) {
                Some(event) => {
                    running = event.location.clone();
                    DayCell {
                        arriving: event.arriving,
                        location: event.location.clone(),
                        prev_location: event.prev_location.clone(),
                        idle: false,
                        activities: event.activities.clone(),
                    }
                }
                None => DayCell {
                    arriving: false,
                    location: running.clone(),
                    prev_location: None,
                    idle: running.is_some(),
                    activities: vec![],
                },
            };

            // Colors are assigned only for emitted days, chronologically, so
            // assignment order matches the visual timeline rather than file
            // order.
            for location in [cell.prev_location.as_deref(), cell.location.as_deref()]
                .into_iter()
                .flatten()
            {
                colors.assign(location);
            }

            days.push((day, CalendarDay::InTrip(cell)));
        }

        let mut warnings = trip.warnings.clone();
        warnings.extend(range_warnings);

        Ok(Calendar {
            title: trip.title.clone(),
            days,
            colors,
            route_stops: trip.route_stops.clone(),
            warnings,
        })
    }

}

pub mod distance {
    //! Driving-distance lookups as an injected capability.
    //!
    //! The calendar pipeline never blocks on distance data: a provider is
    //! asked for an ordered location pair and may simply not know. The
    //! fetch-and-populate side of the cache lives outside this crate.

    use anyhow::{Context, Result};
    use indexmap::IndexMap;
    use serde::{Deserialize, Serialize};
    use std::{fs, path::Path};

    pub trait DistanceProvider {
        /// Human-readable driving distance for an ordered pair, if known.
        fn distance(&self, from: &str, to: &str) -> Option<String>;
    }

    /// Provider with no data at all.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NoDistances;

    impl DistanceProvider for NoDistances {
        fn distance(&self, _from: &str, _to: &str) -> Option<String> {
            None
        }
    }

    /// Read-only per-trip key-value cache, loadable from a JSON object file.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct DistanceCache {
        entries: IndexMap<String, String>,
    }

    impl DistanceCache {
        /// Ordered pairs are keyed `from|to`; `A|B` and `B|A` are distinct.
        pub fn pair_key(from: &str, to: &str) -> String {
            format!("{from}|{to}")
        }

        pub fn insert(&mut self, from: &str, to: &str, distance: impl Into<String>) {
            self.entries.insert(Self::pair_key(from, to), distance.into());
        }

        pub fn len(&self) -> usize {
            self.entries.len()
        }

        pub fn is_empty(&self) -> bool {
            self.entries.is_empty()
        }

        pub fn load(path: &Path) -> Result<Self> {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading distance cache {:?}", path))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing distance cache {:?}", path))
        }

        pub fn save(&self, path: &Path) -> Result<()> {
            let text = serde_json::to_string_pretty(&self.entries)?;
            fs::write(path, text).with_context(|| format!("writing distance cache {:?}", path))
        }
    }

    impl DistanceProvider for DistanceCache {
        fn distance(&self, from: &str, to: &str) -> Option<String> {
            self.entries.get(&Self::pair_key(from, to)).cloned()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn cache_lookup_is_ordered() {
            let mut cache = DistanceCache::default();
            cache.insert("CityA", "CityB", "120 mi");
            assert_eq!(
                cache.distance("CityA", "CityB").as_deref(),
                Some("120 mi")
            );
            assert_eq!(cache.distance("CityB", "CityA"), None);
        }

        #[test]
        fn absent_pairs_are_simply_none() {
            let cache = DistanceCache::default();
            assert_eq!(cache.distance("Nowhere", "Elsewhere"), None);
        }

        #[test]
        fn cache_round_trips_through_json() {
            let dir = tempfile::tempdir().expect("tempdir");
            let path = dir.path().join("distances.json");

            let mut cache = DistanceCache::default();
            cache.insert("CityA", "CityB", "120 mi");
            cache.insert("CityB", "CityC", "45 mi");
            cache.save(&path).expect("save cache");

            let loaded = DistanceCache::load(&path).expect("load cache");
            assert_eq!(loaded, cache);
        }
    }
}

pub mod storage {
    //! Filesystem persistence for trip files: raw text blobs named
    //! `<name>.txt` under a trips directory.

    use crate::core::TripFile;
    use anyhow::{Context, Result, bail};
    use serde::{Deserialize, Serialize};
    use std::{
        fs,
        path::{Path, PathBuf},
    };

    /// Parsing is independent of storage; the parser implements this.
    pub trait TripSource {
        fn parse_trip(&self, abs_path: &Path) -> Result<TripFile>;
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TripSummary {
        pub name: String,
        pub title: String,
        pub path: PathBuf,
    }

    pub trait TripStore {
        /// All trips in the store, sorted by display title.
        fn list(&self) -> Result<Vec<TripSummary>>;
        fn load(&self, name: &str) -> Result<String>;
        fn save(&self, name: &str, content: &str) -> Result<()>;
        /// Create a fresh trip file seeded with a title directive. Refuses to
        /// clobber an existing file.
        fn create(&self, name: &str, title: &str) -> Result<PathBuf>;
    }

    /// Strip everything outside `[A-Za-z0-9_.-]` from a trip name.
    pub fn sanitize_name(name: &str) -> String {
        name.chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
            .collect()
    }

    /// Newly created names are stricter: no dots.
    pub fn sanitize_new_name(name: &str) -> String {
        name.chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
            .collect()
    }

    #[derive(Debug, Clone)]
    pub struct FsTripStore {
        root: PathBuf,
    }

    impl FsTripStore {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }

        pub fn root(&self) -> &Path {
            &self.root
        }

        fn trip_path(&self, name: &str) -> Result<PathBuf> {
            let clean = sanitize_name(name);
            if clean.is_empty() {
                bail!("trip name {:?} is empty after sanitizing", name);
            }
            Ok(self.root.join(format!("{clean}.txt")))
        }
    }

    impl TripStore for FsTripStore {
        fn list(&self) -> Result<Vec<TripSummary>> {
            let mut trips = Vec::new();
            let entries = fs::read_dir(&self.root)
                .with_context(|| format!("reading trips directory {:?}", self.root))?;
            for entry in entries {
                let entry = entry?;
                let path = entry.path();
                if path.extension().map(|e| e == "txt") != Some(true) {
                    continue;
                }
                let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let name = name.to_string();
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("reading {:?}", path))?;
                let title = title_hint(&text).unwrap_or_else(|| name.clone());
                trips.push(TripSummary { name, title, path });
            }
            trips.sort_by(|a, b| a.title.cmp(&b.title));
            Ok(trips)
        }

        fn load(&self, name: &str) -> Result<String> {
            let path = self.trip_path(name)?;
            fs::read_to_string(&path).with_context(|| format!("reading trip {:?}", path))
        }

        fn save(&self, name: &str, content: &str) -> Result<()> {
            let path = self.trip_path(name)?;
            fs::write(&path, content).with_context(|| format!("writing trip {:?}", path))
        }

        fn create(&self, name: &str, title: &str) -> Result<PathBuf> {
            let clean = sanitize_new_name(name);
            if clean.is_empty() {
                bail!("trip name {:?} is empty after sanitizing", name);
            }
            let path = self.root.join(format!("{clean}.txt"));
            if path.exists() {
                bail!("trip {:?} already exists", path);
            }
            fs::write(&path, format!("title {title}\n\n"))
                .with_context(|| format!("creating trip {:?}", path))?;
            Ok(path)
        }
    }

    /// Display-title hint: the first non-blank line, if it is a title
    /// directive. Cheap enough to run during a directory listing.
    fn title_hint(text: &str) -> Option<String> {
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let head = trimmed.get(..5)?;
            let tail = trimmed.get(5..)?;
            if head.eq_ignore_ascii_case("title") && tail.starts_with(char::is_whitespace) {
                return Some(tail.trim().to_string());
            }
            return None;
        }
        None
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn sanitize_strips_path_characters() {
            assert_eq!(sanitize_name("../etc/passwd"), "..etcpasswd");
            assert_eq!(sanitize_name("spring 2026!"), "spring2026");
            assert_eq!(sanitize_new_name("my.trip"), "mytrip");
        }

        #[test]
        fn create_then_list_round_trips() {
            let dir = tempfile::tempdir().expect("tempdir");
            let store = FsTripStore::new(dir.path());

            store.create("spring2026", "Spring 2026").expect("create");
            store.create("fall2025", "Autumn Loop").expect("create");

            let trips = store.list().expect("list");
            assert_eq!(trips.len(), 2);
            // Sorted by title: Autumn before Spring.
            assert_eq!(trips[0].title, "Autumn Loop");
            assert_eq!(trips[0].name, "fall2025");
            assert_eq!(trips[1].title, "Spring 2026");
        }

        #[test]
        fn create_refuses_to_clobber() {
            let dir = tempfile::tempdir().expect("tempdir");
            let store = FsTripStore::new(dir.path());
            store.create("trip", "One").expect("create");
            assert!(store.create("trip", "Two").is_err());
        }

        #[test]
        fn save_and_load_round_trip() {
            let dir = tempfile::tempdir().expect("tempdir");
            let store = FsTripStore::new(dir.path());
            store.save("loop", "title Loop\n1jan26 Camp\n").expect("save");
            let text = store.load("loop").expect("load");
            assert!(text.contains("1jan26 Camp"));
        }

        #[test]
        fn list_falls_back_to_file_name_without_title_line() {
            let dir = tempfile::tempdir().expect("tempdir");
            fs::write(dir.path().join("untitled.txt"), "1jan26 Camp\n").unwrap();
            let store = FsTripStore::new(dir.path());
            let trips = store.list().expect("list");
            assert_eq!(trips[0].title, "untitled");
        }

        #[test]
        fn non_txt_files_are_ignored() {
            let dir = tempfile::tempdir().expect("tempdir");
            fs::write(dir.path().join("notes.md"), "# notes\n").unwrap();
            let store = FsTripStore::new(dir.path());
            assert!(store.list().expect("list").is_empty());
        }
    }
}

pub mod render {
    //! HTML rendering of the calendar grid. Pure string building; the grid
    //! computation is already done by the time anything here runs.

    use crate::calendar::{Calendar, CalendarDay, ColorTable, DayCell};
    use crate::core::DayId;
    use crate::distance::DistanceProvider;
    use nom::{
        IResult,
        branch::alt,
        bytes::complete::{tag, take_till1, take_until, take_while},
        character::complete::{anychar, char},
        error::VerboseError,
        sequence::delimited,
    };
    use std::fmt::Write;

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    const MON_ABBR: [&str; 12] = [
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ];

    const DOW: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

    /* --------------------------- Inline markup --------------------------- */

    /// Inline forms supported inside activity text.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Span {
        Text(String),
        /// `[label](http-url)` — external link.
        Link { label: String, url: String },
        /// `[[Page]]` or `[[Page][label]]` — trip-relative link to another
        /// trip page.
        WikiLink { page: String, label: Option<String> },
    }

    /// Scan activity text into spans. Unmatched markup falls through as
    /// plain text.
    pub fn parse_spans(text: &str) -> Vec<Span> {
        let mut out: Vec<Span> = Vec::new();
        let mut i = text;
        while !i.is_empty() {
            match span_atom(i) {
                Ok((r, span)) => {
                    out.push(span);
                    i = r;
                }
                Err(_) => {
                    // consume one char into a trailing text span
                    let Ok((r, ch)) = anychar::<_, VerboseError<&str>>(i) else {
                        break;
                    };
                    if let Some(Span::Text(prev)) = out.last_mut() {
                        prev.push(ch);
                    } else {
                        out.push(Span::Text(ch.to_string()));
                    }
                    i = r;
                }
            }
        }
        out
    }

    fn span_atom(i: &str) -> PResult<'_, Span> {
        alt((wiki_link, markdown_link))(i)
    }

    fn markdown_link(i: &str) -> PResult<'_, Span> {
        let (i, label) = delimited(char('['), take_till1(|c| c == ']'), char(']'))(i)?;
        let (i, _) = char('(')(i)?;
        let (i, scheme) = alt((tag("https://"), tag("http://")))(i)?;
        let (i, rest) = take_while(|c: char| c != ')')(i)?;
        let (i, _) = char(')')(i)?;
        Ok((
            i,
            Span::Link {
                label: label.to_string(),
                url: format!("{scheme}{rest}"),
            },
        ))
    }

    fn wiki_link(i: &str) -> PResult<'_, Span> {
        let (i, _) = tag("[[")(i)?;
        if let Ok((i2, page)) = take_until::<&str, _, VerboseError<&str>>("][")(i) {
            let (i2, _) = tag("][")(i2)?;
            let (i2, label) = take_until::<&str, _, VerboseError<&str>>("]]")(i2)?;
            let (i2, _) = tag("]]")(i2)?;
            return Ok((
                i2,
                Span::WikiLink {
                    page: page.trim().to_string(),
                    label: Some(label.to_string()),
                },
            ));
        }
        let (i, page) = take_until::<&str, _, VerboseError<&str>>("]]")(i)?;
        let (i, _) = tag("]]")(i)?;
        Ok((
            i,
            Span::WikiLink {
                page: page.trim().to_string(),
                label: None,
            },
        ))
    }

    pub fn escape_html(s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\'' => out.push_str("&#039;"),
                _ => out.push(c),
            }
        }
        out
    }

    /// Activity text to inline HTML: escaped, with link forms converted.
    pub fn render_inline(text: &str) -> String {
        let mut out = String::new();
        for span in parse_spans(text) {
            match span {
                Span::Text(t) => out.push_str(&escape_html(&t)),
                Span::Link { label, url } => {
                    let _ = write!(
                        out,
                        "<a href=\"{}\" target=\"_blank\">{}</a>",
                        escape_html(&url),
                        escape_html(&label)
                    );
                }
                Span::WikiLink { page, label } => {
                    let shown = label.unwrap_or_else(|| page.clone());
                    let _ = write!(
                        out,
                        "<a href=\"?trip={}\">{}</a>",
                        encode_query_value(&page),
                        escape_html(&shown)
                    );
                }
            }
        }
        out
    }

    /* ----------------------------- URL pieces ----------------------------- */

    fn is_unreserved(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~')
    }

    fn percent_encode(s: &str, keep: fn(char) -> bool) -> String {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            if keep(c) {
                out.push(c);
            } else {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).bytes() {
                    let _ = write!(out, "%{b:02X}");
                }
            }
        }
        out
    }

    fn encode_query_value(s: &str) -> String {
        percent_encode(s, is_unreserved)
    }

    /// Directions URL over the route stops; needs at least two stops.
    pub fn map_link_url(stops: &[String]) -> Option<String> {
        if stops.len() < 2 {
            return None;
        }
        let segments: Vec<String> = stops
            .iter()
            .map(|s| percent_encode(s, is_unreserved))
            .collect();
        Some(format!(
            "https://www.google.com/maps/dir/{}",
            segments.join("/")
        ))
    }

    /* ------------------------------- Cells ------------------------------- */

    fn day_label(day: DayId) -> String {
        format!(
            "{:02}-{}-{:02}",
            day.day(),
            MON_ABBR[(day.month() - 1) as usize],
            day.year().rem_euclid(100)
        )
    }

    /// One grid cell. Arriving cells get a two-color gradient plus the
    /// `From → To` label (and a distance annotation when the provider knows
    /// the pair); stay cells get their location color; idle cells with no
    /// activities show an idle badge.
    pub fn cell_html(
        day: DayId,
        calendar_day: &CalendarDay,
        colors: &ColorTable,
        distances: &dyn DistanceProvider,
    ) -> String {
        let label = day_label(day);

        let cell = match calendar_day {
            CalendarDay::OutOfTrip => {
                return format!(
                    "<div class=\"cal-cell out-of-trip\">\n  <span class=\"day-num\">{label}</span>\n</div>\n"
                );
            }
            CalendarDay::InTrip(cell) => cell,
        };

        let mut style = String::new();
        let mut extra = "";

        if cell.arriving && cell.prev_location.is_some() {
            let prev = cell.prev_location.as_deref().unwrap_or_default();
            let pc = colors.color_of(prev).unwrap_or("#cccccc");
            let nc = cell
                .location
                .as_deref()
                .and_then(|loc| colors.color_of(loc))
                .unwrap_or("#aaaaaa");
            style = format!("background: linear-gradient(135deg, {pc} 50%, {nc} 50%);");
            extra = " travel";
        } else if let Some(loc) = cell.location.as_deref() {
            let bg = colors.color_of(loc).unwrap_or("#dddddd");
            style = format!("background: {bg};");
            extra = if cell.idle { " idle" } else { " stay" };
        }

        let mut html = format!("<div class=\"cal-cell{extra}\" style=\"{style}\">\n");
        let _ = writeln!(html, "  <span class=\"day-num\">{label}</span>");

        if cell.arriving {
            let from = escape_html(cell.prev_location.as_deref().unwrap_or_default());
            let to = escape_html(cell.location.as_deref().unwrap_or_default());
            let _ = writeln!(html, "  <span class=\"loc-label\">{from} &rarr; {to}</span>");
            if let (Some(prev), Some(loc)) =
                (cell.prev_location.as_deref(), cell.location.as_deref())
            {
                if let Some(dist) = distances.distance(prev, loc) {
                    let _ = writeln!(
                        html,
                        "  <span class=\"distance\">{}</span>",
                        escape_html(&dist)
                    );
                }
            }
        } else if let Some(loc) = cell.location.as_deref() {
            if !cell.idle {
                let _ = writeln!(
                    html,
                    "  <span class=\"loc-label\">{}</span>",
                    escape_html(loc)
                );
            } else if cell.activities.is_empty() {
                let _ = writeln!(html, "  <span class=\"idle-badge\">idle</span>");
            }
        }

        for activity in &cell.activities {
            let _ = writeln!(
                html,
                "  <span class=\"act-line\">{}</span>",
                render_inline(activity)
            );
        }

        html.push_str("</div>\n");
        html
    }

    /* ------------------------------- Page ------------------------------- */

    fn legend_html(colors: &ColorTable) -> String {
        let mut out = String::from("<div class=\"legend\">\n");
        for (location, color) in colors.iter() {
            let _ = writeln!(
                out,
                "  <div class=\"legend-item\"><span class=\"swatch\" style=\"background:{color}\"></span> {}</div>",
                escape_html(location)
            );
        }
        out.push_str("</div>\n");
        out
    }

    /// The full standalone calendar page.
    pub fn render_calendar_html(calendar: &Calendar, distances: &dyn DistanceProvider) -> String {
        let title = escape_html(&calendar.title);
        let mut out = String::new();
        out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        out.push_str("<meta charset=\"UTF-8\">\n");
        out.push_str(
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
        );
        let _ = writeln!(out, "<title>{title}</title>");
        let _ = writeln!(out, "<style>{PAGE_CSS}</style>");
        out.push_str("</head>\n<body>\n");
        let _ = writeln!(out, "<h1>{title}</h1>");

        if let Some(url) = map_link_url(&calendar.route_stops) {
            let _ = writeln!(
                out,
                "<p class=\"route-link\"><a href=\"{url}\" target=\"_blank\">route map</a></p>"
            );
        }

        out.push_str(&legend_html(&calendar.colors));

        out.push_str("<div class=\"dow-row\">\n");
        for dow in DOW {
            let _ = writeln!(out, "  <div class=\"dow-header\">{dow}</div>");
        }
        out.push_str("</div>\n");

        out.push_str("<div class=\"cal-grid\">\n");
        for (day, calendar_day) in &calendar.days {
            out.push_str(&cell_html(*day, calendar_day, &calendar.colors, distances));
        }
        out.push_str("</div>\n");

        out.push_str("</body>\n</html>\n");
        out
    }

    const PAGE_CSS: &str = r#"
* { box-sizing: border-box; margin: 0; padding: 0; }
body {
    background: #ffffff;
    color: #000000;
    font-family: 'DM Mono', monospace;
    padding: 2.5rem 2rem;
    max-width: 980px;
    margin: 0 auto;
}
h1 { font-family: 'Playfair Display', serif; font-size: 2rem; margin-bottom: 0.6rem; }
.route-link { font-size: 0.7rem; margin-bottom: 1rem; }
.legend { display: flex; flex-wrap: wrap; gap: 0.75rem; margin-bottom: 1rem; }
.legend-item { display: flex; align-items: center; gap: 0.4rem; font-size: 0.7rem; }
.swatch { display: inline-block; width: 12px; height: 12px; border-radius: 2px; }
.dow-row {
    display: grid;
    grid-template-columns: repeat(7, 1fr);
    position: sticky;
    top: 0;
    z-index: 10;
    border-top: 1px solid #000000;
    border-left: 1px solid #000000;
}
.dow-header {
    background: #eeeeee;
    padding: 0.35rem;
    font-size: 0.62rem;
    letter-spacing: 0.12em;
    text-transform: uppercase;
    text-align: center;
    font-weight: bold;
    border-right: 1px solid #000000;
    border-bottom: 1px solid #000000;
}
.cal-grid {
    display: grid;
    grid-template-columns: repeat(7, 1fr);
    border-top: 1px solid #000000;
    border-left: 1px solid #000000;
}
.cal-cell {
    background: #ffffff;
    height: 110px;
    overflow-y: auto;
    overflow-x: hidden;
    padding: 0.4rem 0.5rem;
    font-size: 0.68rem;
    line-height: 1.5;
    border-right: 1px solid #000000;
    border-bottom: 1px solid #000000;
}
.day-num {
    display: block;
    font-size: 0.6rem;
    letter-spacing: 0.03em;
    margin-bottom: 0.2rem;
    font-weight: bold;
}
.loc-label { display: block; font-size: 0.68rem; font-weight: bold; line-height: 1.3; }
.idle-badge { font-size: 0.58rem; letter-spacing: 0.1em; text-transform: uppercase; }
.distance { display: block; font-size: 0.6rem; color: #333333; }
.act-line { display: block; font-size: 0.63rem; line-height: 1.45; white-space: pre-wrap; }
.act-line a { color: #0000cc; text-decoration: underline; }
.act-line a:hover { color: #0000ff; }
"#;

}

pub use calendar::{Calendar, CalendarDay, CalendarError, build_calendar, resolve_range};
pub use parser::{TripParser, parse_trip_from_str, resolve_date_token};
pub use render::render_calendar_html;
