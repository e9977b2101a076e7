//! Destination planning.
//!
//! Pure functions mapping (root, capture date, media kind, config) to the
//! destination directory and the published filename, plus collision-variant
//! allocation. No filesystem access happens here; callers supply the
//! "is this name taken" predicate.

use crate::classify::MediaKind;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Error type for destination planning
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("unable to allocate a unique output name for {0} after 9999 attempts")]
    CounterExhausted(String),
}

/// Month display names, ASCII-only so every filesystem accepts them.
fn month_names(language: &str) -> &'static [&'static str; 12] {
    match language {
        "fr" => &[
            "Janvier", "Fevrier", "Mars", "Avril", "Mai", "Juin", "Juillet", "Aout", "Septembre",
            "Octobre", "Novembre", "Decembre",
        ],
        "es" => &[
            "Enero", "Febrero", "Marzo", "Abril", "Mayo", "Junio", "Julio", "Agosto", "Septiembre",
            "Octubre", "Noviembre", "Diciembre",
        ],
        "de" => &[
            "Januar", "Februar", "Maerz", "April", "Mai", "Juni", "Juli", "August", "September",
            "Oktober", "November", "Dezember",
        ],
        _ => &[
            "January", "February", "March", "April", "May", "June", "July", "August", "September",
            "October", "November", "December",
        ],
    }
}

/// `MM-Name` path segment for a month, e.g. `03-March`.
pub fn month_segment(month: u32, language: &str) -> String {
    if !(1..=12).contains(&month) {
        return "Unknown".to_string();
    }
    format!("{:02}-{}", month, month_names(language)[(month - 1) as usize])
}

/// Directory a file with the given capture date publishes into.
pub fn destination_dir(
    root: &Path,
    date: NaiveDate,
    kind: MediaKind,
    organize_by_date: bool,
    language: &str,
) -> PathBuf {
    if !organize_by_date {
        return root.join(kind.dest_subdir());
    }

    root.join(date.year().to_string())
        .join(month_segment(date.month(), language))
        .join(date.format("%Y-%m-%d").to_string())
        .join(kind.dest_subdir())
}

fn sanitize_regexes() -> (&'static Regex, &'static Regex) {
    static ILLEGAL: OnceLock<Regex> = OnceLock::new();
    static RUNS: OnceLock<Regex> = OnceLock::new();
    (
        ILLEGAL.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").expect("static regex")),
        RUNS.get_or_init(|| Regex::new(r"_+").expect("static regex")),
    )
}

/// Normalize a source filename stem for use in a published name: anything
/// outside `[A-Za-z0-9._-]` becomes `_`, runs collapse, edges trim. A stem
/// with nothing salvageable becomes `file`.
pub fn sanitize_stem(stem: &str) -> String {
    let (illegal, runs) = sanitize_regexes();
    let cleaned = illegal.replace_all(stem, "_");
    let cleaned = runs.replace_all(&cleaned, "_");
    let cleaned = cleaned.trim_matches('_');

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Base published filename: `<YYYY-MM-DD>_<stem>_001.<ext>`.
pub fn base_filename(stem: &str, extension: &str, date: NaiveDate) -> String {
    format!(
        "{}_{}_001.{}",
        date.format("%Y-%m-%d"),
        sanitize_stem(stem),
        extension
    )
}

/// Collision variant `n` of a filename: `_NNN` inserted before the extension.
pub fn variant_filename(base: &str, n: u32) -> String {
    match base.rsplit_once('.') {
        Some((stem, ext)) => format!("{}_{:03}.{}", stem, n, ext),
        None => format!("{}_{:03}", base, n),
    }
}

/// Pick the first name (base, then `_001`…`_9999` variants) the caller's
/// predicate reports as free. Exhausting the counter space is a hard error.
pub fn allocate_name(
    base: &str,
    mut taken: impl FnMut(&str) -> bool,
) -> Result<String, PlanError> {
    if !taken(base) {
        return Ok(base.to_string());
    }

    for n in 1..=9999u32 {
        let candidate = variant_filename(base, n);
        if !taken(&candidate) {
            return Ok(candidate);
        }
    }

    Err(PlanError::CounterExhausted(base.to_string()))
}

/// Temp sibling a conversion writes into before the atomic rename.
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut tmp = final_path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Pattern every published filename satisfies (used by recovery to decide
/// which videos in the destination are ours to re-verify).
pub fn published_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}_[A-Za-z0-9._-]+_\d{3}\.[a-z0-9]+$").expect("static regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_segment_languages() {
        assert_eq!(month_segment(3, "en"), "03-March");
        assert_eq!(month_segment(3, "fr"), "03-Mars");
        assert_eq!(month_segment(8, "es"), "08-Agosto");
        assert_eq!(month_segment(12, "de"), "12-Dezember");
        // Unknown language falls back to English
        assert_eq!(month_segment(1, "zz"), "01-January");
        assert_eq!(month_segment(0, "en"), "Unknown");
        assert_eq!(month_segment(13, "en"), "Unknown");
    }

    #[test]
    fn test_destination_dir_organized() {
        let dir = destination_dir(
            Path::new("/dest"),
            d(2024, 3, 15),
            MediaKind::Photo,
            true,
            "en",
        );
        assert_eq!(
            dir,
            PathBuf::from("/dest/2024/03-March/2024-03-15/images")
        );

        let dir = destination_dir(
            Path::new("/dest"),
            d(2024, 3, 15),
            MediaKind::Video,
            true,
            "fr",
        );
        assert_eq!(dir, PathBuf::from("/dest/2024/03-Mars/2024-03-15/videos"));
    }

    #[test]
    fn test_destination_dir_flat() {
        let dir = destination_dir(
            Path::new("/dest"),
            d(2024, 3, 15),
            MediaKind::Photo,
            false,
            "en",
        );
        assert_eq!(dir, PathBuf::from("/dest/images"));
    }

    #[test]
    fn test_sanitize_stem() {
        assert_eq!(sanitize_stem("IMG 0001 (copy)"), "IMG_0001_copy");
        assert_eq!(sanitize_stem("vacation++photo"), "vacation_photo");
        assert_eq!(sanitize_stem("__already__"), "already");
        assert_eq!(sanitize_stem("été à Paris"), "t_Paris");
        assert_eq!(sanitize_stem("fine-name.ok"), "fine-name.ok");
        assert_eq!(sanitize_stem("###"), "file");
    }

    #[test]
    fn test_base_filename() {
        assert_eq!(
            base_filename("a", "avif", d(2024, 3, 15)),
            "2024-03-15_a_001.avif"
        );
        assert_eq!(
            base_filename("Beach Day!", "mp4", d(2023, 12, 1)),
            "2023-12-01_Beach_Day_001.mp4"
        );
    }

    #[test]
    fn test_variant_filename() {
        assert_eq!(
            variant_filename("2024-03-15_a_001.avif", 1),
            "2024-03-15_a_001_001.avif"
        );
        assert_eq!(
            variant_filename("2024-03-15_a_001.avif", 42),
            "2024-03-15_a_001_042.avif"
        );
    }

    #[test]
    fn test_allocate_name_prefers_base() {
        let name = allocate_name("2024-03-15_a_001.avif", |_| false).unwrap();
        assert_eq!(name, "2024-03-15_a_001.avif");
    }

    #[test]
    fn test_allocate_name_probes_variants() {
        let occupied = [
            "2024-03-15_a_001.avif",
            "2024-03-15_a_001_001.avif",
            "2024-03-15_a_001_002.avif",
        ];
        let name =
            allocate_name("2024-03-15_a_001.avif", |c| occupied.contains(&c)).unwrap();
        assert_eq!(name, "2024-03-15_a_001_003.avif");
    }

    #[test]
    fn test_allocate_name_exhaustion() {
        let result = allocate_name("base.avif", |_| true);
        assert!(matches!(result, Err(PlanError::CounterExhausted(_))));
    }

    #[test]
    fn test_temp_path() {
        assert_eq!(
            temp_path(Path::new("/d/2024-03-15_a_001.avif")),
            PathBuf::from("/d/2024-03-15_a_001.avif.tmp")
        );
    }

    #[test]
    fn test_published_name_regex() {
        let re = published_name_regex();
        assert!(re.is_match("2024-03-15_a_001.avif"));
        assert!(re.is_match("2024-03-15_Beach_Day_001_002.mp4"));
        assert!(!re.is_match("holiday.mp4"));
        assert!(!re.is_match("2024-03-15_a_001.avif.tmp"));
        assert!(!re.is_match("2024-3-15_a_001.avif"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        // Every base filename we generate is legal under the canonical
        // published-name pattern, for arbitrary raw stems.
        #[test]
        fn prop_base_filename_always_legal(
            stem in ".{0,40}",
            year in 1990i32..2025,
            month in 1u32..=12,
            day in 1u32..=28,
            ext in prop_oneof![Just("avif"), Just("webp"), Just("mp4")],
        ) {
            let date = NaiveDate::from_ymd_opt(year, month, day).unwrap();
            let name = base_filename(&stem, ext, date);
            prop_assert!(
                published_name_regex().is_match(&name),
                "generated name not canonical: {}", name
            );
        }

        // Collision variants stay legal too.
        #[test]
        fn prop_variant_filename_legal(
            stem in "[A-Za-z0-9._-]{1,20}",
            n in 1u32..9999,
        ) {
            let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
            let base = base_filename(&stem, "avif", date);
            let variant = variant_filename(&base, n);
            prop_assert!(published_name_regex().is_match(&variant));
        }

        // Sanitized stems never contain a character outside the legal set
        // and never start or end with an underscore.
        #[test]
        fn prop_sanitize_stem_is_clean(stem in ".{0,60}") {
            let clean = sanitize_stem(&stem);
            prop_assert!(!clean.is_empty());
            prop_assert!(clean.chars().all(|c| c.is_ascii_alphanumeric() || ".-_".contains(c)));
            prop_assert!(!clean.starts_with('_'));
            prop_assert!(!clean.ends_with('_'));
            prop_assert!(!clean.contains("__"));
        }
    }
}
