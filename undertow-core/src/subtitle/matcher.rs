//! Pairs subtitle files with the selected video.
//!
//! Two cheap signals decide a match: the subtitle's file stem starts with the
//! video's stem (`Movie.en.srt` for `Movie.mkv`), or the subtitle sits in the
//! same directory as the video. Either one is enough.

use std::path::Path;

/// Outcome of matching one candidate against the selected file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchClass {
    Matched,
    Unmatched,
}

/// Classifies `candidate` relative to `selected`. Both are transfer paths.
pub fn classify(selected: &str, candidate: &str) -> MatchClass {
    let selected = Path::new(selected);
    let candidate = Path::new(candidate);

    let same_prefix = match (stem(selected), stem(candidate)) {
        (Some(video), Some(subtitle)) => subtitle.starts_with(video),
        _ => false,
    };

    if same_prefix || selected.parent() == candidate.parent() {
        MatchClass::Matched
    } else {
        MatchClass::Unmatched
    }
}

/// Orders `candidates` matched-first, keeping input order within each group.
pub fn partition<T, F>(selected: &str, candidates: Vec<T>, path_of: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let (mut matched, unmatched): (Vec<T>, Vec<T>) = candidates
        .into_iter()
        .partition(|candidate| classify(selected, path_of(candidate)) == MatchClass::Matched);
    matched.extend(unmatched);
    matched
}

fn stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|stem| stem.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_directory_matches() {
        assert_eq!(
            classify("Show/S01E01.mkv", "Show/S01E01.en.srt"),
            MatchClass::Matched
        );
        assert_eq!(
            classify("Show/S01E01.mkv", "Show/commentary.srt"),
            MatchClass::Matched
        );
    }

    #[test]
    fn test_unrelated_file_does_not_match() {
        assert_eq!(
            classify("Show/S01E01.mkv", "Other/random.srt"),
            MatchClass::Unmatched
        );
    }

    #[test]
    fn test_prefix_matches_across_directories() {
        assert_eq!(
            classify("Movie/Movie.2019.mkv", "Movie/Subs/Movie.2019.English.srt"),
            MatchClass::Matched
        );
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        assert_eq!(
            classify("Movie/Movie.mkv", "Subs/movie.srt"),
            MatchClass::Unmatched
        );
    }

    #[test]
    fn test_top_level_files_share_a_directory() {
        assert_eq!(classify("movie.mp4", "other.srt"), MatchClass::Matched);
    }

    #[test]
    fn test_partition_keeps_order_within_groups() {
        let candidates = vec![
            "Extras/a.srt",
            "Show/S01E01.en.srt",
            "Extras/b.srt",
            "Show/S01E01.de.srt",
        ];
        let ordered = partition("Show/S01E01.mkv", candidates, |path| *path);
        assert_eq!(
            ordered,
            vec![
                "Show/S01E01.en.srt",
                "Show/S01E01.de.srt",
                "Extras/a.srt",
                "Extras/b.srt",
            ]
        );
    }
}
