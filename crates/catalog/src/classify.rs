use common::{MediaDetails, MovieDetails, SongDetails, TvDetails};

const VIDEO_EXTENSIONS: [&str; 4] = [".mp4", ".mkv", ".avi", ".mov"];
const AUDIO_EXTENSIONS: [&str; 4] = [".mp3", ".flac", ".aac", ".wav"];

const TV_MARKER_LEN: usize = 8; // " S00E00 "
const YEAR_SUFFIX_LEN: usize = 7; // " (0000)"
const SONG_SEP: &str = " - ";

/// Splits a file name into its base name and lowercase extension (with the
/// dot). A leading dot does not start an extension, so `.mp4` has none.
pub fn split_extension(file_name: &str) -> (&str, String) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (
            &file_name[..idx],
            file_name[idx..].to_ascii_lowercase(),
        ),
        _ => (file_name, String::new()),
    }
}

pub fn is_video_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext)
}

pub fn is_audio_extension(ext: &str) -> bool {
    AUDIO_EXTENSIONS.contains(&ext)
}

/// Classifies a file by extension and name pattern. `None` means the file
/// does not belong in the catalog.
pub fn classify_file_name(file_name: &str) -> Option<MediaDetails> {
    let (base, ext) = split_extension(file_name);
    if is_video_extension(&ext) {
        if let Some(tv) = parse_tv_episode(base) {
            return Some(MediaDetails::Tv(tv));
        }
        return parse_movie(base).map(MediaDetails::Movie);
    }
    if is_audio_extension(&ext) {
        return parse_song(base).map(MediaDetails::Song);
    }
    None
}

/// `<Show> S<dd>E<dd> <Episode>`. The show title is greedy, so with several
/// markers the last one is used.
pub fn parse_tv_episode(base: &str) -> Option<TvDetails> {
    let bytes = base.as_bytes();
    if bytes.len() < TV_MARKER_LEN {
        return None;
    }
    for idx in (0..=bytes.len() - TV_MARKER_LEN).rev() {
        let marker = &bytes[idx..idx + TV_MARKER_LEN];
        let is_marker = marker[0] == b' '
            && marker[1].eq_ignore_ascii_case(&b's')
            && marker[2].is_ascii_digit()
            && marker[3].is_ascii_digit()
            && marker[4].eq_ignore_ascii_case(&b'e')
            && marker[5].is_ascii_digit()
            && marker[6].is_ascii_digit()
            && marker[7] == b' ';
        if !is_marker {
            continue;
        }
        let season = two_digits(marker[2], marker[3]);
        let episode = two_digits(marker[5], marker[6]);
        return Some(TvDetails {
            show_title: base[..idx].trim().to_string(),
            release_year: None,
            season,
            episode,
            episode_title: base[idx + TV_MARKER_LEN..].trim().to_string(),
        });
    }
    None
}

/// `<Title> (<dddd>)` at the very end of the base name.
pub fn parse_movie(base: &str) -> Option<MovieDetails> {
    let bytes = base.as_bytes();
    if bytes.len() < YEAR_SUFFIX_LEN {
        return None;
    }
    let split = bytes.len() - YEAR_SUFFIX_LEN;
    let suffix = &bytes[split..];
    if suffix[0] != b' '
        || suffix[1] != b'('
        || !suffix[2..6].iter().all(u8::is_ascii_digit)
        || suffix[6] != b')'
    {
        return None;
    }
    let year = base[split + 2..split + 6].parse::<i32>().ok()?;
    Some(MovieDetails {
        title: base[..split].trim().to_string(),
        release_year: Some(year),
    })
}

/// `<Artist> - <Album> - <Song>`, split from the right.
pub fn parse_song(base: &str) -> Option<SongDetails> {
    let (head, song) = base.rsplit_once(SONG_SEP)?;
    let (artist, album) = head.rsplit_once(SONG_SEP)?;
    Some(SongDetails {
        artist: artist.trim().to_string(),
        album: album.trim().to_string(),
        release_year: None,
        song_title: song.trim().to_string(),
    })
}

fn two_digits(tens: u8, ones: u8) -> i32 {
    i32::from(tens - b'0') * 10 + i32::from(ones - b'0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_movie() {
        let details = classify_file_name("Inception (2010).mp4").unwrap();
        assert_eq!(
            details,
            MediaDetails::Movie(MovieDetails {
                title: "Inception".to_string(),
                release_year: Some(2010),
            })
        );
    }

    #[test]
    fn movie_title_is_trimmed() {
        let movie = parse_movie("  The Thing   (1982)").unwrap();
        assert_eq!(movie.title, "The Thing");
        assert_eq!(movie.release_year, Some(1982));
    }

    #[test]
    fn movie_requires_four_digit_year_at_end() {
        assert!(parse_movie("Heat (95)").is_none());
        assert!(parse_movie("Heat(1995)").is_none());
        assert!(parse_movie("Heat (1995) extended").is_none());
        assert!(classify_file_name("Heat.mkv").is_none());
    }

    #[test]
    fn classifies_tv_episode_with_zero_padding() {
        let details = classify_file_name("Breaking Bad S05E02 Madrigal.mkv").unwrap();
        assert_eq!(
            details,
            MediaDetails::Tv(TvDetails {
                show_title: "Breaking Bad".to_string(),
                release_year: None,
                season: 5,
                episode: 2,
                episode_title: "Madrigal".to_string(),
            })
        );
    }

    #[test]
    fn tv_markers_are_case_insensitive() {
        let tv = parse_tv_episode("The Wire s01e10 The Cost").unwrap();
        assert_eq!((tv.season, tv.episode), (1, 10));
        assert_eq!(tv.show_title, "The Wire");
        assert_eq!(tv.episode_title, "The Cost");
    }

    #[test]
    fn tv_wins_over_movie_pattern() {
        let details = classify_file_name("Cosmos S01E01 Shores (1980).mp4").unwrap();
        match details {
            MediaDetails::Tv(tv) => {
                assert_eq!(tv.show_title, "Cosmos");
                assert_eq!(tv.episode_title, "Shores (1980)");
            }
            other => panic!("expected tv episode, got {:?}", other),
        }
    }

    #[test]
    fn tv_requires_exactly_two_digits() {
        assert!(parse_tv_episode("Show S1E01 Title").is_none());
        assert!(parse_tv_episode("Show S001E01 Title").is_none());
        assert!(parse_tv_episode("Show S01E01").is_none());
    }

    #[test]
    fn classifies_song() {
        let details =
            classify_file_name("Queen - A Night at the Opera - Bohemian Rhapsody.flac").unwrap();
        assert_eq!(
            details,
            MediaDetails::Song(SongDetails {
                artist: "Queen".to_string(),
                album: "A Night at the Opera".to_string(),
                release_year: None,
                song_title: "Bohemian Rhapsody".to_string(),
            })
        );
    }

    #[test]
    fn single_separator_is_not_a_song() {
        assert!(classify_file_name("Queen - Bohemian Rhapsody.mp3").is_none());
    }

    #[test]
    fn song_split_is_greedy_from_the_right() {
        let song = parse_song("A - B - C - D").unwrap();
        assert_eq!(song.artist, "A - B");
        assert_eq!(song.album, "C");
        assert_eq!(song.song_title, "D");
    }

    #[test]
    fn pattern_must_match_extension_family() {
        assert!(classify_file_name("Inception (2010).mp3").is_none());
        assert!(classify_file_name("Queen - Album - Song.mp4").is_none());
        assert!(classify_file_name("readme.txt").is_none());
        assert!(classify_file_name(".mp4").is_none());
    }

    #[test]
    fn extension_is_case_insensitive() {
        let (base, ext) = split_extension("Alien (1979).MKV");
        assert_eq!(base, "Alien (1979)");
        assert_eq!(ext, ".mkv");
        assert!(classify_file_name("Alien (1979).MKV").is_some());
    }
}
